//! Secondary indexes over ring records.
//!
//! An index maps each record to zero or more field values through an
//! [`Indexer`]. Entries live in a [`MemoryBlock`] under the key
//! `encode_value(value) ++ id.to_key()`, so a scan over the block yields
//! hits ordered by value and then by id. Indexes are derived state and are
//! rebuilt from the ring's records on open.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use schemat_catalog::{encode_node, Catalog};
use schemat_store::{Block, MemoryBlock};
use schemat_types::{ItemId, KEY_LEN};

use crate::error::{DbError, DbResult};

/// Declares an index over one catalog field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Name the index is queried by.
    pub name: String,
    /// Catalog path whose values are indexed.
    pub field: String,
}

impl IndexDescriptor {
    pub fn new(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
        }
    }
}

/// Derives index values from a record.
pub trait Indexer: Send + Sync {
    /// The index name.
    fn name(&self) -> &str;

    /// Values under which the record is indexed. Empty if not indexed.
    fn index_values(&self, data: &Value) -> Vec<Value>;
}

/// Indexes every occurrence of a catalog field.
pub struct FieldIndexer {
    desc: IndexDescriptor,
}

impl FieldIndexer {
    pub fn new(desc: IndexDescriptor) -> Self {
        Self { desc }
    }
}

impl Indexer for FieldIndexer {
    fn name(&self) -> &str {
        &self.desc.name
    }

    fn index_values(&self, data: &Value) -> Vec<Value> {
        let catalog = match Catalog::decode(data) {
            Ok(c) => c,
            Err(e) => {
                warn!(index = %self.desc.name, error = %e, "record is not a catalog, skipping");
                return Vec::new();
            }
        };
        catalog
            .get_all(self.desc.field.as_str())
            .into_iter()
            .filter_map(|node| encode_node(node).ok())
            .collect()
    }
}

/// Stored under each index key; the id is the key's suffix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct IndexEntry {
    /// Field value as JSON text.
    value: String,
}

/// One index match.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexHit {
    /// The raw index key; hits from several rings merge on this.
    pub key: Vec<u8>,
    /// The indexed field value.
    pub value: Value,
    /// The record the value belongs to.
    pub id: ItemId,
}

/// Value bounds for an index scan: `start <= value < stop`, except that
/// `start == stop` selects exactly that value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexRange {
    pub start: Option<Value>,
    pub stop: Option<Value>,
}

impl IndexRange {
    /// Every entry.
    pub fn full() -> Self {
        Self::default()
    }

    /// Entries whose value equals `value` exactly.
    pub fn exact(value: Value) -> Self {
        Self {
            start: Some(value.clone()),
            stop: Some(value),
        }
    }

    pub fn new(start: Option<Value>, stop: Option<Value>) -> Self {
        Self { start, stop }
    }

    fn is_exact(&self) -> bool {
        self.start.is_some() && self.start == self.stop
    }

    fn key_bounds(&self) -> (Option<Vec<u8>>, Option<Vec<u8>>) {
        let start = self.start.as_ref().map(encode_value);
        if self.is_exact() {
            let stop = start.as_deref().and_then(prefix_successor);
            return (start, stop);
        }
        (start, self.stop.as_ref().map(encode_value))
    }
}

// Type tags, in sort order.
const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_STRING: u8 = 0x04;
const TAG_REF: u8 = 0x05;
const TAG_OTHER: u8 = 0x06;

/// Order-preserving byte encoding of an index value.
///
/// Values of one JSON type sort in their natural order; different types sort
/// by tag. References (`{"@": id}`) sort by id.
pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                out.push(TAG_INT);
                out.extend_from_slice(&((i as u64) ^ (1 << 63)).to_be_bytes());
            } else {
                out.push(TAG_FLOAT);
                out.extend_from_slice(&float_key(n.as_f64().unwrap_or(0.0)));
            }
        }
        Value::String(s) => {
            out.push(TAG_STRING);
            push_escaped(&mut out, s.as_bytes());
        }
        Value::Object(obj) if obj.len() == 1 && obj.get("@").is_some_and(Value::is_u64) => {
            out.push(TAG_REF);
            let id = obj.get("@").and_then(Value::as_u64).unwrap_or_default();
            out.extend_from_slice(&id.to_be_bytes());
        }
        other => {
            out.push(TAG_OTHER);
            push_escaped(&mut out, other.to_string().as_bytes());
        }
    }
    out
}

/// Append `bytes` with `0x00` escaped as `00 ff`, then the terminator
/// `00 01`. No encoding is a prefix of another, and shorter strings sort
/// first.
fn push_escaped(out: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        out.push(b);
        if b == 0x00 {
            out.push(0xff);
        }
    }
    out.extend_from_slice(&[0x00, 0x01]);
}

fn float_key(f: f64) -> [u8; 8] {
    let bits = f.to_bits();
    let ordered = if bits >> 63 == 1 { !bits } else { bits | (1 << 63) };
    ordered.to_be_bytes()
}

/// The smallest key greater than every key starting with `prefix`.
fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut out = prefix.to_vec();
    while let Some(last) = out.pop() {
        if last < 0xff {
            out.push(last + 1);
            return Some(out);
        }
    }
    None
}

/// Pending entry changes for one record.
#[derive(Debug, Default)]
pub struct IndexDelta {
    remove: Vec<Vec<u8>>,
    put: Vec<(Vec<u8>, Vec<u8>)>,
}

/// An index attached to one ring.
pub struct RingIndex {
    indexer: Box<dyn Indexer>,
    block: MemoryBlock,
}

impl RingIndex {
    pub fn new(indexer: Box<dyn Indexer>) -> Self {
        Self {
            indexer,
            block: MemoryBlock::new(),
        }
    }

    /// A [`FieldIndexer`] index built from a descriptor.
    pub fn from_descriptor(desc: IndexDescriptor) -> Self {
        Self::new(Box::new(FieldIndexer::new(desc)))
    }

    pub fn name(&self) -> &str {
        self.indexer.name()
    }

    pub fn len(&self) -> usize {
        self.block.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }

    /// Replace the entries of `id`: drop those derived from `old`, add those
    /// derived from `new`.
    pub fn update(&self, id: ItemId, old: Option<&Value>, new: Option<&Value>) -> DbResult<()> {
        let delta = self.delta(id, old, new)?;
        self.apply(delta)
    }

    /// The entry changes that [`RingIndex::update`] would make, without
    /// making them.
    pub fn delta(&self, id: ItemId, old: Option<&Value>, new: Option<&Value>) -> DbResult<IndexDelta> {
        let mut delta = IndexDelta::default();
        if let Some(old) = old {
            for value in self.indexer.index_values(old) {
                delta.remove.push(entry_key(&value, id));
            }
        }
        if let Some(new) = new {
            for value in self.indexer.index_values(new) {
                let entry = IndexEntry {
                    value: value.to_string(),
                };
                delta.put.push((entry_key(&value, id), bincode::serialize(&entry)?));
            }
        }
        Ok(delta)
    }

    pub fn apply(&self, delta: IndexDelta) -> DbResult<()> {
        for key in &delta.remove {
            self.block.del(key)?;
        }
        for (key, raw) in &delta.put {
            self.block.put(key, raw)?;
        }
        Ok(())
    }

    /// Drop every entry and index `records` from scratch.
    pub fn rebuild<'a>(&self, records: impl IntoIterator<Item = (ItemId, &'a Value)>) -> DbResult<()> {
        self.block.erase()?;
        for (id, data) in records {
            self.update(id, None, Some(data))?;
        }
        Ok(())
    }

    pub fn clear(&self) -> DbResult<()> {
        Ok(self.block.erase()?)
    }

    /// Hits within `range`, ordered by value then id.
    pub fn scan(&self, range: &IndexRange) -> DbResult<Vec<IndexHit>> {
        let (start, stop) = range.key_bounds();
        let pairs = self.block.scan(start.as_deref(), stop.as_deref())?;
        let mut hits = Vec::with_capacity(pairs.len());
        for (key, raw) in pairs {
            let entry: IndexEntry = bincode::deserialize(&raw)?;
            let value: Value = serde_json::from_str(&entry.value)?;
            let id = ItemId::from_key_suffix(&key).map_err(|e| {
                DbError::DataAccess(format!("bad index key {}: {e}", hex::encode(&key)))
            })?;
            hits.push(IndexHit { key, value, id });
        }
        Ok(hits)
    }
}

fn entry_key(value: &Value, id: ItemId) -> Vec<u8> {
    let mut key = encode_value(value);
    key.reserve(KEY_LEN);
    key.extend_from_slice(&id.to_key());
    key
}
