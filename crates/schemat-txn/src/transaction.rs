use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use schemat_catalog::{Catalog, Node, Reference, Step};
use schemat_db::Edit;
use schemat_types::{ItemId, Record};

use crate::error::{TxError, TxResult};
use crate::item::Item;
use crate::sink::{ServerSink, TxSink};

/// A batch of object mutations pushed to a sink in one `save`.
///
/// Items are staged under their [`Reference`]: persisted items by id,
/// newborn items by a provisional id drawn from a per-transaction counter.
/// `save` inserts newborns first, rewrites provisional references to the
/// ids they received, then updates every edited item.
///
/// There is no atomicity: a failure partway leaves earlier writes in place.
/// A failed insert or update leaves its item staged as it was, so `save`
/// can be retried.
pub struct Transaction<S> {
    id: Uuid,
    sink: S,
    staged: IndexMap<Reference, Item>,
    /// Provisional ids already swapped for real ones.
    resolved: HashMap<u64, ItemId>,
    next_provisional: u64,
    captured: IndexMap<ItemId, Value>,
    closed: bool,
}

impl<S> std::fmt::Debug for Transaction<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("staged", &self.staged.len())
            .field("captured", &self.captured.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl<S: TxSink> Transaction<S> {
    pub fn new(sink: S) -> Self {
        let id = Uuid::now_v7();
        debug!(tx = %id, "transaction opened");
        Self {
            id,
            sink,
            staged: IndexMap::new(),
            resolved: HashMap::new(),
            next_provisional: 1,
            captured: IndexMap::new(),
            closed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn get(&self, key: Reference) -> Option<&Item> {
        self.staged.get(&key)
    }

    /// Staged items in staging order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.staged.values()
    }

    /// The real id a provisional id was saved under, if it has been.
    pub fn resolve_provisional(&self, provisional: u64) -> Option<ItemId> {
        self.resolved.get(&provisional).copied()
    }

    // ---------------------------------------------------------------
    // Staging
    // ---------------------------------------------------------------

    /// Add `item` to the staging set and return the key it is staged under.
    ///
    /// A newborn gets a fresh provisional id. A persisted item is keyed by
    /// its id; staging a second, differently edited copy of an id whose
    /// staged copy is also edited fails with [`TxError::Conflict`].
    pub fn stage(&mut self, mut item: Item) -> TxResult<Reference> {
        self.check_open()?;
        match (item.id, item.provisional) {
            (None, Some(n)) if self.staged.contains_key(&Reference::Provisional(n)) => {
                let key = Reference::Provisional(n);
                self.staged.insert(key, item);
                Ok(key)
            }
            (None, _) => {
                let n = self.next_provisional;
                self.next_provisional += 1;
                item.provisional = Some(n);
                let key = Reference::Provisional(n);
                self.staged.insert(key, item);
                debug!(tx = %self.id, provisional = n, "staged newborn");
                Ok(key)
            }
            (Some(id), _) => {
                let key = Reference::Persisted(id);
                match self.staged.get_mut(&key) {
                    Some(existing)
                        if existing.edited && item.edited && existing.data != item.data =>
                    {
                        warn!(tx = %self.id, id = %id, "conflicting copies staged");
                        Err(TxError::Conflict(id))
                    }
                    Some(existing) => {
                        if item.edited {
                            *existing = item;
                        }
                        Ok(key)
                    }
                    None => {
                        self.staged.insert(key, item);
                        debug!(tx = %self.id, id = %id, "staged");
                        Ok(key)
                    }
                }
            }
        }
    }

    /// Stage a new object built from `data`.
    pub fn create(&mut self, data: Catalog) -> TxResult<Reference> {
        self.stage(Item::newborn(data))
    }

    /// The transaction's own copy of `item`, staged on first use.
    ///
    /// Later calls for the same item return the same copy, so edits made
    /// through it accumulate. A newborn `item` receives the provisional id
    /// of its staged copy.
    pub fn get_mutable(&mut self, item: &mut Item) -> TxResult<&mut Item> {
        self.check_open()?;
        let key = match item.reference() {
            Some(key) if self.staged.contains_key(&key) => key,
            _ => {
                let key = self.stage(item.clone())?;
                if let Reference::Provisional(n) = key {
                    item.provisional = Some(n);
                }
                key
            }
        };
        self.staged.get_mut(&key).ok_or(TxError::NotStaged(key))
    }

    /// Mark every staged item obsolete so no save will write it.
    pub fn discard(&mut self) {
        for item in self.staged.values_mut() {
            item.obsolete = true;
        }
        debug!(tx = %self.id, items = self.staged.len(), "transaction discarded");
    }

    // ---------------------------------------------------------------
    // Saving
    // ---------------------------------------------------------------

    /// Write staged items to the sink: `keys` only, or everything staged.
    ///
    /// Newborns are inserted first so that edited items can refer to them
    /// by real id. A newborn referring to a newborn that is not inserted yet
    /// is inserted with that reference blanked and updated afterwards.
    pub async fn save(&mut self, keys: Option<&[Reference]>) -> TxResult<()> {
        let selected: Vec<Reference> = match keys {
            Some(keys) => {
                if let Some(missing) = keys.iter().find(|k| !self.staged.contains_key(*k)) {
                    return Err(TxError::NotStaged(*missing));
                }
                keys.to_vec()
            }
            None => self.staged.keys().copied().collect(),
        };
        let (newborn, existing): (Vec<Reference>, Vec<Reference>) = selected
            .into_iter()
            .partition(|k| matches!(k, Reference::Provisional(_)));

        let mut pending = existing;
        for key in newborn {
            if let Some(id) = self.insert_newborn(key).await? {
                pending.push(Reference::Persisted(id));
            }
        }

        // Every reference to an inserted newborn now gets its real id.
        for item in self.staged.values_mut() {
            item.data = rewrite(&item.data, &self.resolved, false).0;
        }

        for key in pending {
            self.update_edited(key).await?;
        }
        info!(tx = %self.id, staged = self.staged.len(), "saved");
        Ok(())
    }

    /// Insert one newborn and restage it under its real id. Returns the id
    /// if the item still needs an update for blanked references.
    async fn insert_newborn(&mut self, key: Reference) -> TxResult<Option<ItemId>> {
        let Reference::Provisional(n) = key else {
            return Ok(None);
        };
        let item = self.staged.get(&key).ok_or(TxError::NotStaged(key))?;
        if item.obsolete {
            return Ok(None);
        }
        let (data, blanked) = rewrite(&item.data, &self.resolved, true);
        let encoded = data.encode()?;

        let id = self.sink.insert(encoded.clone()).await?;
        self.resolved.insert(n, id);
        if let Some(mut item) = self.staged.shift_remove(&key) {
            item.id = Some(id);
            item.provisional = None;
            item.edited = blanked;
            self.staged.insert(Reference::Persisted(id), item);
        }
        self.capture([Record::new(id, encoded)]);
        info!(tx = %self.id, provisional = n, id = %id, deferred = blanked, "inserted newborn");
        Ok(blanked.then_some(id))
    }

    async fn update_edited(&mut self, key: Reference) -> TxResult<()> {
        let Some(id) = key.id() else {
            return Ok(());
        };
        let Some(item) = self.staged.get(&key) else {
            return Err(TxError::NotStaged(key));
        };
        if item.obsolete || !item.edited {
            return Ok(());
        }
        let data = item.data.encode()?;
        let record = self.sink.update(id, vec![Edit::total(data)]).await?;
        if let Some(item) = self.staged.get_mut(&key) {
            item.edited = false;
        }
        debug!(tx = %self.id, id = %id, "updated");
        self.capture([record]);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Back-propagation
    // ---------------------------------------------------------------

    /// Remember records acknowledged by the database. A later capture of the
    /// same id replaces the earlier one.
    pub fn capture(&mut self, records: impl IntoIterator<Item = Record>) {
        for record in records {
            self.captured.insert(record.id, record.data);
        }
    }

    pub fn captured(&self) -> Vec<Record> {
        self.captured
            .iter()
            .map(|(id, data)| Record::new(*id, data.clone()))
            .collect()
    }

    pub fn take_captured(&mut self) -> Vec<Record> {
        self.captured
            .drain(..)
            .map(|(id, data)| Record::new(id, data))
            .collect()
    }

    fn check_open(&self) -> TxResult<()> {
        if self.closed {
            return Err(TxError::Closed(self.id));
        }
        Ok(())
    }
}

impl<S: ServerSink> Transaction<S> {
    /// Close the transaction, save everything staged, and clear the staging
    /// set. Retrying after a failed commit saves what is left.
    pub async fn commit(&mut self) -> TxResult<()> {
        self.closed = true;
        self.save(None).await?;
        let written = self.staged.len();
        self.staged.clear();
        info!(tx = %self.id, items = written, captured = self.captured.len(), "committed");
        Ok(())
    }
}

/// Replace provisional references that have real ids. Unknown ones are
/// nulled when `blank` is set and left alone otherwise; the flag reports
/// whether anything was nulled.
fn rewrite(data: &Catalog, resolved: &HashMap<u64, ItemId>, blank: bool) -> (Catalog, bool) {
    let mut blanked = false;
    let out = data.transform(&mut |node: &Node, _: &[Step]| match node {
        Node::Ref(Reference::Provisional(n)) => match resolved.get(n) {
            Some(id) => Some(Node::Ref(Reference::Persisted(*id))),
            None if blank => {
                blanked = true;
                Some(Node::null())
            }
            None => None,
        },
        _ => None,
    });
    (out, blanked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use schemat_db::{Database, DbError, Ring, RingDescriptor};
    use serde_json::json;

    use crate::sink::{ActionRequest, ActionResponse, RemoteAction, RemoteSink};

    fn db() -> Arc<Database> {
        let mut db = Database::new();
        db.push_ring(Ring::open(&RingDescriptor::memory(0, Some(100)).readonly(true), Duration::ZERO).unwrap());
        db.push_ring(Ring::open(&RingDescriptor::memory(100, None), Duration::ZERO).unwrap());
        Arc::new(db)
    }

    fn named(name: &str) -> Catalog {
        Catalog::from_entries([("name", name)])
    }

    // ---------------------------------------------------------------
    // Provisional ids
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn newborn_gets_real_id_and_stays_staged() {
        let db = db();
        let mut tx = Transaction::new(Arc::clone(&db));
        let key = tx.create(named("a")).unwrap();
        assert!(matches!(key, Reference::Provisional(1)));

        tx.save(None).await.unwrap();

        let id = tx.resolve_provisional(1).unwrap();
        assert!(tx.get(key).is_none());
        let item = tx.get(Reference::Persisted(id)).unwrap();
        assert_eq!(item.id(), Some(id));
        assert_eq!(item.provisional(), None);
        assert!(!item.is_edited());
        assert_eq!(db.select(id).await.unwrap(), json!({"name": "a"}));

        // Still eligible for further edits.
        let mut copy = item.clone();
        tx.get_mutable(&mut copy).unwrap().set("name", "b").unwrap();
        tx.save(None).await.unwrap();
        assert_eq!(db.select(id).await.unwrap(), json!({"name": "b"}));
    }

    #[tokio::test]
    async fn provisional_ids_are_distinct() {
        let mut tx = Transaction::new(db());
        let a = tx.create(named("a")).unwrap();
        let b = tx.create(named("b")).unwrap();
        assert_ne!(a, b);
        assert_eq!(tx.len(), 2);
    }

    #[tokio::test]
    async fn references_to_newborns_are_resolved() {
        let db = db();
        let mut tx = Transaction::new(Arc::clone(&db));
        let category = tx.create(named("cat")).unwrap();
        let mut child = named("child");
        child.push("category", Node::Ref(category));
        tx.create(child).unwrap();

        tx.save(None).await.unwrap();

        let cat_id = tx.resolve_provisional(1).unwrap();
        let child_id = tx.resolve_provisional(2).unwrap();
        assert_eq!(
            db.select(child_id).await.unwrap(),
            json!({"name": "child", "category": {"@": cat_id.get()}})
        );
        let staged = tx.get(Reference::Persisted(child_id)).unwrap();
        assert_eq!(staged.get("category").and_then(Node::as_reference), Some(Reference::Persisted(cat_id)));
    }

    #[tokio::test]
    async fn forward_reference_is_blanked_then_updated() {
        let db = db();
        let mut tx = Transaction::new(Arc::clone(&db));
        // The first newborn points at the second, which is inserted later.
        let mut first = named("first");
        first.push("next", Node::Ref(Reference::Provisional(2)));
        tx.create(first).unwrap();
        tx.create(named("second")).unwrap();

        tx.save(None).await.unwrap();

        let first_id = tx.resolve_provisional(1).unwrap();
        let second_id = tx.resolve_provisional(2).unwrap();
        assert_eq!(
            db.select(first_id).await.unwrap(),
            json!({"name": "first", "next": {"@": second_id.get()}})
        );
        let acked = tx.captured();
        let first_ack = acked.iter().find(|r| r.id == first_id).unwrap();
        assert_eq!(first_ack.data["next"], json!({"@": second_id.get()}));
    }

    #[tokio::test]
    async fn edited_item_referencing_unsaved_newborn_fails() {
        let db = db();
        let id = Database::insert(&db, None, json!({"name": "x"})).await.unwrap();
        let mut tx = Transaction::new(Arc::clone(&db));
        let newborn = tx.create(named("n")).unwrap();

        let mut loaded = Item::from_record(&db.get(id).await.unwrap()).unwrap();
        tx.get_mutable(&mut loaded).unwrap().set("link", Node::Ref(newborn)).unwrap();

        let err = tx.save(Some(&[Reference::Persisted(id)])).await;
        assert!(matches!(err, Err(TxError::Catalog(_))));
    }

    // ---------------------------------------------------------------
    // Staging rules
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn get_mutable_returns_the_same_copy() {
        let mut tx = Transaction::new(db());
        let mut item = Item::loaded(ItemId::new(120), named("a"));
        tx.get_mutable(&mut item).unwrap().set("x", 1i64).unwrap();
        tx.get_mutable(&mut item).unwrap().set("y", 2i64).unwrap();

        let staged = tx.get(Reference::Persisted(ItemId::new(120))).unwrap();
        assert!(staged.get("x").is_some() && staged.get("y").is_some());
        assert_eq!(tx.len(), 1);
    }

    #[tokio::test]
    async fn get_mutable_stages_a_newborn_once() {
        let db = db();
        let mut tx = Transaction::new(Arc::clone(&db));
        let mut item = Item::newborn(named("x"));
        tx.get_mutable(&mut item).unwrap().set("a", 1i64).unwrap();
        tx.get_mutable(&mut item).unwrap().set("b", 2i64).unwrap();

        assert_eq!(tx.len(), 1);
        let key = item.reference().unwrap();
        assert!(matches!(key, Reference::Provisional(_)));
        let staged = tx.get(key).unwrap();
        assert!(staged.get("a").is_some() && staged.get("b").is_some());

        tx.save(None).await.unwrap();
        assert_eq!(db.scan(schemat_types::IdRange::full()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn conflicting_edited_copies_are_rejected() {
        let mut tx = Transaction::new(db());
        let mut a = Item::loaded(ItemId::new(120), named("a"));
        let mut b = a.clone();
        a.set("v", 1i64).unwrap();
        b.set("v", 2i64).unwrap();

        tx.stage(a.clone()).unwrap();
        assert!(matches!(tx.stage(b), Err(TxError::Conflict(_))));
        // Same edits again is not a conflict.
        tx.stage(a).unwrap();
        // An unedited copy never displaces the staged one.
        tx.stage(Item::loaded(ItemId::new(120), named("a"))).unwrap();
        assert!(tx.get(Reference::Persisted(ItemId::new(120))).unwrap().is_edited());
    }

    #[tokio::test]
    async fn discard_prevents_writes() {
        let db = db();
        let mut tx = Transaction::new(Arc::clone(&db));
        tx.create(named("gone")).unwrap();
        tx.discard();
        tx.save(None).await.unwrap();
        assert!(tx.captured().is_empty());
        assert!(db.scan(schemat_types::IdRange::full()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_rejects_unknown_keys() {
        let mut tx = Transaction::new(db());
        let err = tx.save(Some(&[Reference::Provisional(9)])).await;
        assert!(matches!(err, Err(TxError::NotStaged(_))));
    }

    // ---------------------------------------------------------------
    // Commit
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn commit_saves_and_closes() {
        let db = db();
        let mut tx = Transaction::new(Arc::clone(&db));
        tx.create(named("a")).unwrap();
        tx.commit().await.unwrap();

        assert!(tx.is_closed());
        assert!(tx.is_empty());
        assert_eq!(tx.captured().len(), 1);
        assert!(matches!(tx.create(named("b")), Err(TxError::Closed(_))));
    }

    #[tokio::test]
    async fn update_of_readonly_record_lands_above() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.jsonl");
        std::fs::write(&path, "{\"id\":5,\"name\":\"core\"}\n").unwrap();
        let mut db = Database::new();
        db.push_ring(Ring::open(&RingDescriptor::file(&path, 0, Some(100)).readonly(true), Duration::ZERO).unwrap());
        db.push_ring(Ring::open(&RingDescriptor::memory(0, None), Duration::ZERO).unwrap());
        let db = Arc::new(db);

        let mut loaded = Item::from_record(&db.get(ItemId::new(5)).await.unwrap()).unwrap();
        let mut tx = Transaction::new(Arc::clone(&db));
        tx.get_mutable(&mut loaded).unwrap().set("name", "mine").unwrap();
        tx.commit().await.unwrap();

        assert_eq!(db.select(ItemId::new(5)).await.unwrap(), json!({"name": "mine"}));
        assert_eq!(
            db.ring(0).unwrap().select(ItemId::new(5)).await.unwrap(),
            Some(json!({"name": "core"}))
        );
    }

    // ---------------------------------------------------------------
    // Failure and retry
    // ---------------------------------------------------------------

    /// Fails the first `fail` inserts, then delegates.
    struct Flaky {
        db: Arc<Database>,
        fail: AtomicUsize,
    }

    #[async_trait]
    impl TxSink for Flaky {
        async fn insert(&self, data: Value) -> TxResult<ItemId> {
            if self.fail.load(Ordering::SeqCst) > 0 {
                self.fail.fetch_sub(1, Ordering::SeqCst);
                return Err(TxError::Db(DbError::DataAccess("injected".into())));
            }
            TxSink::insert(&self.db, data).await
        }

        async fn update(&self, id: ItemId, edits: Vec<Edit>) -> TxResult<Record> {
            TxSink::update(&self.db, id, edits).await
        }
    }

    impl ServerSink for Flaky {}

    #[tokio::test]
    async fn failed_insert_leaves_staging_intact() {
        let db = db();
        let mut tx = Transaction::new(Flaky {
            db: Arc::clone(&db),
            fail: AtomicUsize::new(1),
        });
        let key = tx.create(named("retry")).unwrap();

        assert!(tx.save(None).await.is_err());
        assert!(tx.get(key).is_some());
        assert!(tx.captured().is_empty());

        tx.commit().await.unwrap();
        let id = tx.resolve_provisional(1).unwrap();
        assert_eq!(db.select(id).await.unwrap(), json!({"name": "retry"}));
    }

    #[tokio::test]
    async fn capture_keeps_last_version() {
        let mut tx = Transaction::new(db());
        tx.capture([Record::new(1u64, json!({"v": 1}))]);
        tx.capture([Record::new(2u64, json!({"v": 1})), Record::new(1u64, json!({"v": 2}))]);
        let captured = tx.take_captured();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0], Record::new(1u64, json!({"v": 2})));
        assert!(tx.captured().is_empty());
    }

    // ---------------------------------------------------------------
    // Client side
    // ---------------------------------------------------------------

    struct Loopback(Arc<Database>);

    #[async_trait]
    impl RemoteAction for Loopback {
        async fn call(&self, request: ActionRequest) -> TxResult<ActionResponse> {
            crate::sink::serve_action(&self.0, request).await
        }
    }

    #[tokio::test]
    async fn client_transaction_saves_remotely() {
        let db = db();
        let mut tx = Transaction::new(RemoteSink::new(Loopback(Arc::clone(&db))));
        tx.create(named("remote")).unwrap();
        tx.save(None).await.unwrap();

        let acked = tx.take_captured();
        assert_eq!(acked.len(), 1);
        assert_eq!(db.select(acked[0].id).await.unwrap(), json!({"name": "remote"}));
    }
}
