use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length in bytes of an encoded [`ItemId`] key.
pub const KEY_LEN: usize = 8;

/// Process-wide unique identifier of a persisted item.
///
/// Ids are flat integers. Every ring owns a contiguous `[start, stop)` slice
/// of the id space, so an id alone is enough to tell which rings may hold it.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(u64);

impl ItemId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw integer value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The next id in sequence, or `None` on overflow.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// Encode as an order-preserving binary key.
    ///
    /// Big-endian encoding makes byte-lexicographic comparison of keys agree
    /// with numeric comparison of ids, which range scans rely on.
    pub fn to_key(self) -> [u8; KEY_LEN] {
        self.0.to_be_bytes()
    }

    /// Decode from a binary key produced by [`ItemId::to_key`].
    pub fn from_key(key: &[u8]) -> Result<Self, TypeError> {
        let bytes: [u8; KEY_LEN] = key.try_into().map_err(|_| TypeError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: key.len(),
        })?;
        Ok(Self(u64::from_be_bytes(bytes)))
    }

    /// Decode the trailing id of a composite key (`prefix ++ id_key`).
    pub fn from_key_suffix(key: &[u8]) -> Result<Self, TypeError> {
        if key.len() < KEY_LEN {
            return Err(TypeError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            });
        }
        Self::from_key(&key[key.len() - KEY_LEN..])
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({})", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ItemId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ItemId> for u64 {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

impl FromStr for ItemId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix('#').unwrap_or(s);
        s.parse::<u64>()
            .map(Self)
            .map_err(|e| TypeError::InvalidId(format!("{s}: {e}")))
    }
}

/// Half-open range of ids used to bound scans. `None` on either side means
/// unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    pub start: Option<ItemId>,
    pub stop: Option<ItemId>,
}

impl IdRange {
    /// The whole id space.
    pub const fn full() -> Self {
        Self {
            start: None,
            stop: None,
        }
    }

    pub fn new(start: impl Into<ItemId>, stop: impl Into<ItemId>) -> Self {
        Self {
            start: Some(start.into()),
            stop: Some(stop.into()),
        }
    }

    /// Everything at or above `start`.
    pub fn starting_at(start: impl Into<ItemId>) -> Self {
        Self {
            start: Some(start.into()),
            stop: None,
        }
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.start.map_or(true, |s| id >= s) && self.stop.map_or(true, |s| id < s)
    }

    /// Key-space bounds for a block scan.
    pub fn to_key_bounds(&self) -> (Option<Vec<u8>>, Option<Vec<u8>>) {
        (
            self.start.map(|id| id.to_key().to_vec()),
            self.stop.map(|id| id.to_key().to_vec()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn key_roundtrip() {
        let id = ItemId::new(1234567);
        assert_eq!(ItemId::from_key(&id.to_key()).unwrap(), id);
    }

    #[test]
    fn key_wrong_length() {
        let err = ItemId::from_key(&[1, 2, 3]).unwrap_err();
        assert_eq!(err, TypeError::InvalidKeyLength { expected: 8, actual: 3 });
    }

    #[test]
    fn key_suffix_decodes_trailing_id() {
        let mut key = b"prefix".to_vec();
        key.extend_from_slice(&ItemId::new(42).to_key());
        assert_eq!(ItemId::from_key_suffix(&key).unwrap(), ItemId::new(42));
        assert!(ItemId::from_key_suffix(&[0; 3]).is_err());
    }

    #[test]
    fn parse_with_and_without_hash() {
        assert_eq!("17".parse::<ItemId>().unwrap(), ItemId::new(17));
        assert_eq!("#17".parse::<ItemId>().unwrap(), ItemId::new(17));
        assert!("abc".parse::<ItemId>().is_err());
    }

    #[test]
    fn next_overflows_to_none() {
        assert_eq!(ItemId::new(1).next(), Some(ItemId::new(2)));
        assert_eq!(ItemId::new(u64::MAX).next(), None);
    }

    #[test]
    fn serde_is_transparent() {
        let json = serde_json::to_string(&ItemId::new(5)).unwrap();
        assert_eq!(json, "5");
    }

    #[test]
    fn range_contains_is_half_open() {
        let r = IdRange::new(10u64, 20u64);
        assert!(!r.contains(ItemId::new(9)));
        assert!(r.contains(ItemId::new(10)));
        assert!(r.contains(ItemId::new(19)));
        assert!(!r.contains(ItemId::new(20)));
        assert!(IdRange::full().contains(ItemId::new(u64::MAX)));
        assert!(IdRange::starting_at(5u64).contains(ItemId::new(1_000_000)));
    }

    proptest! {
        #[test]
        fn key_order_matches_numeric_order(a in any::<u64>(), b in any::<u64>()) {
            let (ka, kb) = (ItemId::new(a).to_key(), ItemId::new(b).to_key());
            prop_assert_eq!(a.cmp(&b), ka.cmp(&kb));
        }
    }
}
