use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use crate::error::StoreResult;
use crate::traits::{Block, KeyValue};

/// In-memory, `BTreeMap`-based block.
///
/// Used for volatile rings and for secondary index storage. Everything lives
/// behind a `RwLock`; values are cloned on read and write.
pub struct MemoryBlock {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryBlock {
    /// Create a new empty block.
    pub fn new() -> Self {
        Self {
            map: RwLock::new(BTreeMap::new()),
        }
    }

    /// Total bytes across all stored values.
    pub fn total_bytes(&self) -> u64 {
        self.map
            .read()
            .expect("lock poisoned")
            .values()
            .map(|v| v.len() as u64)
            .sum()
    }
}

impl Default for MemoryBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered range read over a byte-keyed map.
pub(crate) fn scan_map(
    map: &BTreeMap<Vec<u8>, Vec<u8>>,
    start: Option<&[u8]>,
    stop: Option<&[u8]>,
) -> Vec<KeyValue> {
    if let (Some(s), Some(e)) = (start, stop) {
        if s >= e {
            return Vec::new();
        }
    }
    let lo = start.map_or(Bound::Unbounded, |s| Bound::Included(s.to_vec()));
    let hi = stop.map_or(Bound::Unbounded, |e| Bound::Excluded(e.to_vec()));
    map.range((lo, hi))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl Block for MemoryBlock {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let map = self.map.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let mut map = self.map.write().expect("lock poisoned");
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn del(&self, key: &[u8]) -> StoreResult<bool> {
        let mut map = self.map.write().expect("lock poisoned");
        Ok(map.remove(key).is_some())
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

    fn erase(&self) -> StoreResult<()> {
        self.map.write().expect("lock poisoned").clear();
        Ok(())
    }
}

impl std::fmt::Debug for MemoryBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlock")
            .field("key_count", &self.len())
            .finish()
    }
}
