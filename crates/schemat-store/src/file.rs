use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use schemat_types::{IdRange, ItemId};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::memory::scan_map;
use crate::traits::{Block, KeyValue};

/// Field holding the record id on every line.
const ID_FIELD: &str = "id";
/// Field wrapping data that cannot be spread inline next to `id`.
const DATA_FIELD: &str = "__data";

/// File-backed record block in a sequential text format.
///
/// On-disk format, one JSON object per line:
/// ```text
/// {"id": 12, "name": "a", ...}          data is an object: fields inline
/// {"id": 13, "__data": [["k", 1], ...]} anything else: wrapped
/// ```
///
/// The whole file is loaded into an in-memory `BTreeMap` on open; writes
/// only touch memory and mark the block dirty. [`Block::flush`] rewrites the
/// file atomically (temp file + rename). Keys must be [`ItemId`] keys and
/// values JSON text, since both are decoded again when writing the file.
pub struct FileBlock {
    path: PathBuf,
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    dirty: AtomicBool,
}

impl FileBlock {
    /// Open (or create) the block file at `path`.
    ///
    /// Every record is checked against `bounds`; an out-of-range id or a
    /// duplicate id fails the whole open.
    pub fn open(path: &Path, bounds: IdRange) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut map = BTreeMap::new();
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            for (n, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let (id, data) = parse_line(&line).map_err(|reason| StoreError::Corrupt {
                    path: path.display().to_string(),
                    line: n + 1,
                    reason,
                })?;
                if !bounds.contains(id) {
                    return Err(StoreError::OutOfBounds {
                        id,
                        start: bound_str(bounds.start),
                        stop: bound_str(bounds.stop),
                    });
                }
                let value = serde_json::to_vec(&data)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                if map.insert(id.to_key().to_vec(), value).is_some() {
                    return Err(StoreError::DuplicateId(id));
                }
            }
        }

        info!(path = %path.display(), records = map.len(), "opened block file");
        Ok(Self {
            path: path.to_path_buf(),
            map: RwLock::new(map),
            dirty: AtomicBool::new(false),
        })
    }

    /// Path to the block file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self, snapshot: &BTreeMap<Vec<u8>, Vec<u8>>) -> StoreResult<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let tmp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let mut w = BufWriter::new(tmp.as_file());
            for (key, value) in snapshot {
                let id = ItemId::from_key(key).map_err(|source| StoreError::InvalidKey {
                    key: hex::encode(key),
                    source,
                })?;
                let data: Value = serde_json::from_slice(value)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                let line = format_line(id, data);
                serde_json::to_writer(&mut w, &line)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                w.write_all(b"\n")?;
            }
            w.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

fn bound_str(id: Option<ItemId>) -> String {
    id.map_or_else(|| "inf".to_string(), |id| id.to_string())
}

/// Split one line into its id and data.
fn parse_line(line: &str) -> Result<(ItemId, Value), String> {
    let mut obj = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(obj)) => obj,
        Ok(other) => return Err(format!("expected an object, got {other}")),
        Err(e) => return Err(e.to_string()),
    };
    let id = obj
        .shift_remove(ID_FIELD)
        .and_then(|v| v.as_u64())
        .map(ItemId::new)
        .ok_or_else(|| "missing or non-integer id".to_string())?;
    let data = match obj.shift_remove(DATA_FIELD) {
        Some(data) if obj.is_empty() => data,
        Some(_) => return Err("__data must be the only field besides id".to_string()),
        None => Value::Object(obj),
    };
    Ok((id, data))
}

fn format_line(id: ItemId, data: Value) -> Value {
    let mut line = Map::new();
    line.insert(ID_FIELD.to_string(), Value::from(id.get()));
    match data {
        Value::Object(fields) if !fields.contains_key(ID_FIELD) && !fields.contains_key(DATA_FIELD) => {
            line.extend(fields);
        }
        other => {
            line.insert(DATA_FIELD.to_string(), other);
        }
    }
    Value::Object(line)
}

impl Block for FileBlock {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let map = self.map.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let mut map = self.map.write().expect("lock poisoned");
        map.insert(key.to_vec(), value.to_vec());
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    fn del(&self, key: &[u8]) -> StoreResult<bool> {
        let mut map = self.map.write().expect("lock poisoned");
        let removed = map.remove(key).is_some();
        if removed {
            self.dirty.store(true, Ordering::Release);
        }
        Ok(removed)
    }

    fn scan(&self, start: Option<&[u8]>, stop: Option<&[u8]>) -> StoreResult<Vec<KeyValue>> {
        let map = self.map.read().expect("lock poisoned");
        Ok(scan_map(&map, start, stop))
    }

    fn len(&self) -> usize {
        self.map.read().expect("lock poisoned").len()
    }

    fn last_key(&self) -> StoreResult<Option<Vec<u8>>> {
        let map = self.map.read().expect("lock poisoned");
        Ok(map.keys().next_back().cloned())
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn flush(&self) -> StoreResult<()> {
        // Clear the flag before taking the snapshot so that a write racing
        // with this flush marks the block dirty again.
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let snapshot = self.map.read().expect("lock poisoned").clone();
        if let Err(e) = self.write_file(&snapshot) {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        debug!(path = %self.path.display(), records = snapshot.len(), "block flushed");
        Ok(())
    }

    fn erase(&self) -> StoreResult<()> {
        self.map.write().expect("lock poisoned").clear();
        self.dirty.store(true, Ordering::Release);
        self.flush()
    }
}

impl std::fmt::Debug for FileBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBlock")
            .field("path", &self.path)
            .field("key_count", &self.len())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
