use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use schemat_store::{Block, FileBlock, MemoryBlock};
use schemat_types::{IdRange, ItemId, Record};

use crate::config::RingDescriptor;
use crate::edit::{apply_all, Edit};
use crate::error::{DbError, DbResult};
use crate::flush::Flusher;
use crate::index::{IndexDelta, IndexHit, IndexRange, RingIndex};

/// Mutable per-ring state, guarded by the ring lock.
struct RingState {
    /// Highest id handed out or loaded so far.
    autoincrement: Option<ItemId>,
}

/// One layer of the database: an id-range partition over a single block.
///
/// A ring only ever holds ids in `[start_id, stop_id)`. Every
/// read-modify-write sequence runs under the ring's async lock, so
/// concurrent inserts never hand out the same id.
pub struct Ring {
    name: Option<String>,
    label: String,
    start_id: ItemId,
    stop_id: Option<ItemId>,
    readonly: bool,
    block: Arc<dyn Block>,
    indexes: Vec<RingIndex>,
    state: Mutex<RingState>,
    flusher: Flusher,
}

impl Ring {
    /// Wrap an already-open block.
    ///
    /// Rebuilds the ring's indexes from the block and seeds the
    /// autoincrement counter from its greatest id.
    pub fn new(
        desc: &RingDescriptor,
        block: Arc<dyn Block>,
        flush_delay: Duration,
    ) -> DbResult<Self> {
        desc.validate()?;
        let indexes: Vec<RingIndex> = desc
            .indexes
            .iter()
            .cloned()
            .map(RingIndex::from_descriptor)
            .collect();

        let records = decode_records(block.scan(None, None)?)?;
        for index in &indexes {
            index.rebuild(records.iter().map(|r| (r.id, &r.data)))?;
        }
        let autoincrement = records.last().map(|r| r.id);

        let ring = Self {
            name: desc.name.clone(),
            label: desc.label(),
            start_id: desc.start_id,
            stop_id: desc.stop_id,
            readonly: desc.readonly,
            block,
            indexes,
            state: Mutex::new(RingState { autoincrement }),
            flusher: Flusher::new(flush_delay),
        };
        info!(
            ring = %ring.label,
            records = records.len(),
            readonly = ring.readonly,
            "ring opened"
        );
        Ok(ring)
    }

    /// Open the block a descriptor points at: a file, or memory when the
    /// descriptor has neither `file` nor `item`.
    ///
    /// `item` descriptors must be resolved by the database first.
    pub fn open(desc: &RingDescriptor, flush_delay: Duration) -> DbResult<Self> {
        if desc.item.is_some() {
            return Err(DbError::Config(format!(
                "ring {}: item-backed descriptor must be resolved before opening",
                desc.label()
            )));
        }
        let block: Arc<dyn Block> = match &desc.file {
            Some(path) => Arc::new(FileBlock::open(path, desc.range())?),
            None => Arc::new(MemoryBlock::new()),
        };
        Self::new(desc, block, flush_delay)
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name, file path, or start id, whichever identifies the ring best.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn start_id(&self) -> ItemId {
        self.start_id
    }

    pub fn stop_id(&self) -> Option<ItemId> {
        self.stop_id
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn range(&self) -> IdRange {
        IdRange {
            start: Some(self.start_id),
            stop: self.stop_id,
        }
    }

    pub fn contains_id(&self, id: ItemId) -> bool {
        self.range().contains(id)
    }

    /// Whether this ring accepts a write of `id` (or of a new id).
    pub fn writable(&self, id: Option<ItemId>) -> bool {
        !self.readonly && id.map_or(true, |id| self.contains_id(id))
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.iter().any(|i| i.name() == name)
    }

    pub fn len(&self) -> usize {
        self.block.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Read a record held by this ring.
    pub async fn select(&self, id: ItemId) -> DbResult<Option<Value>> {
        self.read(id)
    }

    /// Store a new record and return its id.
    ///
    /// With an explicit id the record must not exist yet. Without one, the
    /// next id is `max(autoincrement + 1, start_id)`.
    pub async fn insert(&self, id: Option<ItemId>, data: Value) -> DbResult<ItemId> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        let id = match id {
            Some(id) => {
                self.check_range(id)?;
                id
            }
            None => self.next_id(&state)?,
        };
        if self.block.get(&id.to_key())?.is_some() {
            return Err(DbError::ItemExists(id));
        }
        state.autoincrement = Some(state.autoincrement.map_or(id, |a| a.max(id)));
        self.write(id, None, &data)?;
        drop(state);
        debug!(ring = %self.label, id = %id, "inserted");
        Ok(id)
    }

    /// Apply `edits` to a record held by this ring. Returns the new data, or
    /// `None` if the record is absent.
    pub async fn update(&self, id: ItemId, edits: &[Edit]) -> DbResult<Option<Value>> {
        self.modify(id, None, edits).await
    }

    /// Apply `edits` to this ring's copy of `id`, or to `base` if the ring
    /// has none yet, and store the result here.
    pub(crate) async fn update_over(&self, id: ItemId, base: &Value, edits: &[Edit]) -> DbResult<Value> {
        self.modify(id, Some(base), edits)
            .await?
            .ok_or(DbError::ItemNotFound(id))
    }

    /// Create or overwrite a record.
    pub async fn save(&self, id: ItemId, data: Value) -> DbResult<()> {
        self.check_writable()?;
        self.check_range(id)?;
        let mut state = self.state.lock().await;
        let old = self.read(id)?;
        state.autoincrement = Some(state.autoincrement.map_or(id, |a| a.max(id)));
        self.write(id, old.as_ref(), &data)?;
        drop(state);
        debug!(ring = %self.label, id = %id, "saved");
        Ok(())
    }

    /// Remove a record. Returns `false` if it was absent; a read-only ring
    /// never deletes and always returns `false`.
    pub async fn delete(&self, id: ItemId) -> DbResult<bool> {
        if self.readonly {
            return Ok(false);
        }
        let _state = self.state.lock().await;
        let Some(old) = self.read(id)? else {
            return Ok(false);
        };
        let deltas = self.index_deltas(id, Some(&old), None)?;
        self.block.del(&id.to_key())?;
        self.schedule_flush();
        self.apply_deltas(deltas)?;
        debug!(ring = %self.label, id = %id, "deleted");
        Ok(true)
    }

    /// Records within `range`, ascending by id.
    pub async fn scan(&self, range: IdRange) -> DbResult<Vec<Record>> {
        let (start, stop) = range.to_key_bounds();
        decode_records(self.block.scan(start.as_deref(), stop.as_deref())?)
    }

    /// Hits of the named index, ordered by value then id. `None` if the ring
    /// has no such index.
    pub async fn scan_index(&self, name: &str, range: &IndexRange) -> DbResult<Option<Vec<IndexHit>>> {
        match self.indexes.iter().find(|i| i.name() == name) {
            Some(index) => Ok(Some(index.scan(range)?)),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Persist pending writes now.
    pub async fn flush(&self) -> DbResult<()> {
        let block = Arc::clone(&self.block);
        tokio::task::spawn_blocking(move || block.flush())
            .await
            .map_err(|e| DbError::DataAccess(format!("flush task failed: {e}")))??;
        Ok(())
    }

    /// Flush, then remove every record, reset the id counter, and clear the
    /// indexes.
    pub async fn erase(&self) -> DbResult<()> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        self.flush().await?;
        self.block.erase()?;
        for index in &self.indexes {
            index.clear()?;
        }
        state.autoincrement = None;
        info!(ring = %self.label, "ring erased");
        Ok(())
    }

    /// Flush and release the ring.
    pub async fn close(&self) -> DbResult<()> {
        let _state = self.state.lock().await;
        self.flush().await?;
        info!(ring = %self.label, "ring closed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn check_writable(&self) -> DbResult<()> {
        if self.readonly {
            return Err(DbError::ReadOnly(format!("ring {} is read-only", self.label)));
        }
        Ok(())
    }

    fn check_range(&self, id: ItemId) -> DbResult<()> {
        if self.contains_id(id) {
            return Ok(());
        }
        Err(DbError::InvalidId {
            id,
            ring: self.label.clone(),
            reason: format!(
                "outside [{}, {})",
                self.start_id,
                self.stop_id.map_or_else(|| "inf".to_string(), |s| s.to_string())
            ),
        })
    }

    fn read(&self, id: ItemId) -> DbResult<Option<Value>> {
        match self.block.get(&id.to_key())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// The id an insert without an explicit id receives.
    fn next_id(&self, state: &RingState) -> DbResult<ItemId> {
        let exhausted = |id: ItemId| DbError::InvalidId {
            id,
            ring: self.label.clone(),
            reason: "id space exhausted".into(),
        };
        let next = match state.autoincrement {
            None => self.start_id,
            Some(last) => last.next().ok_or_else(|| exhausted(last))?.max(self.start_id),
        };
        if !self.contains_id(next) {
            return Err(exhausted(next));
        }
        Ok(next)
    }

    /// Read, edit, and write back one record under the ring lock.
    async fn modify(&self, id: ItemId, base: Option<&Value>, edits: &[Edit]) -> DbResult<Option<Value>> {
        self.check_writable()?;
        self.check_range(id)?;
        let mut state = self.state.lock().await;
        let current = self.read(id)?;
        let Some(old) = current.as_ref().or(base) else {
            return Ok(None);
        };
        let new = apply_all(old, edits)?;
        state.autoincrement = Some(state.autoincrement.map_or(id, |a| a.max(id)));
        self.write(id, current.as_ref(), &new)?;
        drop(state);
        debug!(ring = %self.label, id = %id, edits = edits.len(), "updated");
        Ok(Some(new))
    }

    /// Store a record and bring the indexes along. Index entries are
    /// computed before the block changes.
    fn write(&self, id: ItemId, old: Option<&Value>, new: &Value) -> DbResult<()> {
        let raw = serde_json::to_vec(new)?;
        let deltas = self.index_deltas(id, old, Some(new))?;
        self.block.put(&id.to_key(), &raw)?;
        self.schedule_flush();
        self.apply_deltas(deltas)
    }

    fn index_deltas(&self, id: ItemId, old: Option<&Value>, new: Option<&Value>) -> DbResult<Vec<IndexDelta>> {
        self.indexes.iter().map(|index| index.delta(id, old, new)).collect()
    }

    fn apply_deltas(&self, deltas: Vec<IndexDelta>) -> DbResult<()> {
        for (index, delta) in self.indexes.iter().zip(deltas) {
            index.apply(delta)?;
        }
        Ok(())
    }

    fn schedule_flush(&self) {
        self.flusher.schedule(&self.block, &self.label);
    }
}

impl std::fmt::Debug for Ring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ring")
            .field("label", &self.label)
            .field("range", &self.range())
            .field("readonly", &self.readonly)
            .field("records", &self.block.len())
            .finish()
    }
}

fn decode_records(pairs: Vec<schemat_store::KeyValue>) -> DbResult<Vec<Record>> {
    pairs
        .into_iter()
        .map(|(key, raw)| {
            let id = ItemId::from_key(&key)
                .map_err(|e| DbError::DataAccess(format!("bad record key {}: {e}", hex::encode(&key))))?;
            Ok(Record::new(id, serde_json::from_slice(&raw)?))
        })
        .collect()
}
