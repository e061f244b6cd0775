use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use schemat_types::{IdRange, ItemId, Record};

use crate::config::{DatabaseConfig, RingDescriptor};
use crate::edit::Edit;
use crate::error::{DbError, DbResult};
use crate::index::{IndexHit, IndexRange};
use crate::merge::merge_sorted;
use crate::ring::Ring;

/// Result of moving one record in [`Database::move_records`].
#[derive(Debug)]
pub enum MoveOutcome {
    Moved {
        id: ItemId,
        /// Label of the ring the record left.
        from: String,
    },
    Failed {
        id: ItemId,
        error: DbError,
    },
}

impl MoveOutcome {
    pub fn id(&self) -> ItemId {
        match self {
            MoveOutcome::Moved { id, .. } | MoveOutcome::Failed { id, .. } => *id,
        }
    }

    pub fn is_moved(&self) -> bool {
        matches!(self, MoveOutcome::Moved { .. })
    }
}

/// An ordered stack of rings.
///
/// Ring 0 is the innermost (bottom) layer and the last ring the outermost
/// (top). Reads probe from the top down and return the first hit, so an
/// upper ring shadows lower rings for ids both contain. Writes of an
/// existing record go to the ring that holds it or, if that ring refuses,
/// to the nearest ring above that accepts the id.
#[derive(Debug, Default)]
pub struct Database {
    rings: Vec<Arc<Ring>>,
}

impl Database {
    /// An empty database. Add rings with [`Database::push_ring`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Open every ring of `config`, bottom first.
    ///
    /// A ring declared with `item` reads its descriptor from that record,
    /// which must already be reachable through the rings opened before it.
    pub async fn open(config: &DatabaseConfig) -> DbResult<Self> {
        let mut db = Self::new();
        for desc in &config.rings {
            let desc = match desc.item {
                Some(item) => db.resolve_descriptor(desc, item).await?,
                None => desc.clone(),
            };
            db.push_ring(Ring::open(&desc, config.flush_delay())?);
        }
        info!(rings = db.rings.len(), "database opened");
        Ok(db)
    }

    async fn resolve_descriptor(&self, desc: &RingDescriptor, item: ItemId) -> DbResult<RingDescriptor> {
        let data = self.select(item).await.map_err(|e| {
            DbError::Config(format!("ring {}: cannot load descriptor item {item}: {e}", desc.label()))
        })?;
        let stored: RingDescriptor = serde_json::from_value(data).map_err(|e| {
            DbError::Config(format!("ring {}: item {item} is not a ring descriptor: {e}", desc.label()))
        })?;
        let merged = desc.merge_stored(stored)?;
        merged.validate()?;
        debug!(ring = %merged.label(), item = %item, "resolved item-backed ring");
        Ok(merged)
    }

    /// Stack `ring` on top of the existing rings.
    pub fn push_ring(&mut self, ring: Ring) {
        self.rings.push(Arc::new(ring));
    }

    /// Rings from bottom to top.
    pub fn rings(&self) -> &[Arc<Ring>] {
        &self.rings
    }

    /// The ring at `level` (0 is the bottom).
    pub fn ring(&self, level: usize) -> Option<&Arc<Ring>> {
        self.rings.get(level)
    }

    /// The outermost ring.
    pub fn top(&self) -> Option<&Arc<Ring>> {
        self.rings.last()
    }

    /// The topmost ring with this name.
    pub fn find_ring(&self, name: &str) -> Option<&Arc<Ring>> {
        self.rings.iter().rev().find(|r| r.name() == Some(name))
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Read a record from the topmost ring that holds it.
    pub async fn select(&self, id: ItemId) -> DbResult<Value> {
        Ok(self.locate(id).await?.1)
    }

    /// Like [`Database::select`], returning the record.
    pub async fn get(&self, id: ItemId) -> DbResult<Record> {
        Ok(Record::new(id, self.select(id).await?))
    }

    /// Find the topmost ring holding `id`: `(level, data)`.
    async fn locate(&self, id: ItemId) -> DbResult<(usize, Value)> {
        for (level, ring) in self.rings.iter().enumerate().rev() {
            if let Some(data) = ring.select(id).await? {
                return Ok((level, data));
            }
        }
        Err(DbError::ItemNotFound(id))
    }

    /// Store a new record in the outermost ring that accepts it.
    pub async fn insert(&self, id: Option<ItemId>, data: Value) -> DbResult<ItemId> {
        let ring = self
            .rings
            .iter()
            .rev()
            .find(|r| r.writable(id))
            .ok_or(DbError::NotInsertable(id))?;
        let id = ring.insert(id, data).await?;
        debug!(ring = %ring.label(), id = %id, "insert");
        Ok(id)
    }

    /// Apply `edits` to a record and store the result.
    ///
    /// The record is located in the topmost ring holding it. If that ring
    /// accepts the write, the edits run there under its lock. Otherwise the
    /// update goes to the nearest ring above that accepts the id, on top of
    /// that ring's own copy if one appeared meanwhile. Lower copies stay
    /// untouched and are shadowed from then on.
    pub async fn update(&self, id: ItemId, edits: &[Edit]) -> DbResult<Record> {
        let (level, old) = self.locate(id).await?;
        for (at, ring) in self.rings.iter().enumerate().skip(level) {
            if !ring.writable(Some(id)) {
                continue;
            }
            let data = if at == level {
                ring.update(id, edits).await?.ok_or(DbError::ItemNotFound(id))?
            } else {
                debug!(id = %id, from = level, to = at, "update forwarded upward");
                ring.update_over(id, &old, edits).await?
            };
            return Ok(Record::new(id, data));
        }
        Err(DbError::ReadOnly(format!(
            "no writable ring at or above level {level} accepts item {id}"
        )))
    }

    /// Remove a record from the topmost writable ring holding it.
    ///
    /// Copies in read-only rings are skipped. If the only copies are
    /// read-only the call fails with [`DbError::ReadOnly`].
    pub async fn delete(&self, id: ItemId) -> DbResult<()> {
        let mut readonly_hit = false;
        for ring in self.rings.iter().rev() {
            if ring.is_readonly() {
                readonly_hit |= ring.select(id).await?.is_some();
                continue;
            }
            if ring.delete(id).await? {
                debug!(ring = %ring.label(), id = %id, "delete");
                return Ok(());
            }
        }
        if readonly_hit {
            return Err(DbError::ReadOnly(format!("item {id} exists only in read-only rings")));
        }
        Err(DbError::ItemNotFound(id))
    }

    /// Records of every ring within `range`, merged by ascending id.
    ///
    /// An id present in several rings appears once per ring, upper copy
    /// first.
    pub async fn scan(&self, range: IdRange) -> DbResult<Vec<Record>> {
        let mut streams = Vec::with_capacity(self.rings.len());
        for ring in self.rings.iter().rev() {
            streams.push(ring.scan(range).await?);
        }
        Ok(merge_sorted(streams, |r| r.id))
    }

    /// Hits of the named index across every ring that carries it, merged by
    /// value then id.
    pub async fn scan_index(&self, name: &str, range: &IndexRange) -> DbResult<Vec<IndexHit>> {
        let mut streams = Vec::new();
        for ring in self.rings.iter().rev() {
            if let Some(hits) = ring.scan_index(name, range).await? {
                streams.push(hits);
            }
        }
        if streams.is_empty() {
            return Err(DbError::IndexNotFound(name.to_string()));
        }
        Ok(merge_sorted(streams, |h| h.key.clone()))
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    /// Move records into the ring named `target`.
    ///
    /// Each record is taken from the topmost ring holding it, inserted into
    /// the target under the same id, then deleted from its source. Failures
    /// are reported per record and do not stop the batch.
    pub async fn move_records(&self, ids: &[ItemId], target: &str) -> DbResult<Vec<MoveOutcome>> {
        let target_ring = self
            .find_ring(target)
            .ok_or_else(|| DbError::RingNotFound(target.to_string()))?;
        let mut outcomes = Vec::with_capacity(ids.len());
        for &id in ids {
            let outcome = match self.move_one(id, target_ring).await {
                Ok(from) => MoveOutcome::Moved { id, from },
                Err(error) => {
                    warn!(id = %id, target, error = %error, "move failed");
                    MoveOutcome::Failed { id, error }
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn move_one(&self, id: ItemId, target: &Arc<Ring>) -> DbResult<String> {
        let (level, data) = self.locate(id).await?;
        let source = &self.rings[level];
        if Arc::ptr_eq(source, target) {
            return Err(DbError::DataAccess(format!(
                "item {id} is already in ring {}",
                target.label()
            )));
        }
        if source.is_readonly() {
            return Err(DbError::ReadOnly(format!(
                "cannot move item {id} out of read-only ring {}",
                source.label()
            )));
        }
        target.insert(Some(id), data).await.map_err(|e| match e {
            DbError::ItemExists(id) => DbError::DataAccess(format!(
                "item {id} already exists in ring {}",
                target.label()
            )),
            other => other,
        })?;
        source.delete(id).await?;
        info!(id = %id, from = %source.label(), to = %target.label(), "record moved");
        Ok(source.label().to_string())
    }

    /// Flush every ring now.
    pub async fn flush(&self) -> DbResult<()> {
        for ring in &self.rings {
            ring.flush().await?;
        }
        Ok(())
    }

    /// Flush and close every ring, top first.
    pub async fn close(&self) -> DbResult<()> {
        for ring in self.rings.iter().rev() {
            ring.close().await?;
        }
        info!("database closed");
        Ok(())
    }
}
