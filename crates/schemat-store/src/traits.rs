use crate::error::StoreResult;

/// A key/value pair returned by a scan.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Physical storage for one partition.
///
/// Keys and values are opaque bytes. Keys compare byte-lexicographically,
/// and [`Block::scan`] returns pairs in that order, so callers that need
/// numeric ordering must encode numbers in an order-preserving form.
///
/// Implementations must be `Send + Sync`; individual calls are atomic, but
/// read-modify-write sequences spanning several calls need external locking.
pub trait Block: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key is absent.
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Write (create or overwrite) the value under `key`.
    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Remove `key`. Returns `true` if it was present.
    fn del(&self, key: &[u8]) -> StoreResult<bool>;

    /// All pairs with `start <= key < stop`, ascending. `None` bounds are open.
    fn scan(&self, start: Option<&[u8]>, stop: Option<&[u8]>) -> StoreResult<Vec<KeyValue>>;

    /// Number of stored keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The greatest stored key, if any.
    fn last_key(&self) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.scan(None, None)?.pop().map(|(k, _)| k))
    }

    /// True if there are writes not yet persisted by [`Block::flush`].
    fn is_dirty(&self) -> bool {
        false
    }

    /// Persist pending writes. A no-op for volatile blocks.
    fn flush(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Remove every key (and persist the empty state, if backed by a file).
    fn erase(&self) -> StoreResult<()>;

    /// Read several keys. Backends may override for fewer round-trips.
    fn get_batch(&self, keys: &[&[u8]]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|k| self.get(k)).collect()
    }
}
