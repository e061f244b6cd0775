use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::ItemId;

/// A persisted item: its id plus the encoded form of its data.
///
/// `data` is the self-describing JSON encoding produced by the catalog codec;
/// the storage layers never interpret it beyond what secondary indexes and
/// field-level edits need.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: ItemId,
    pub data: Value,
}

impl Record {
    pub fn new(id: impl Into<ItemId>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}
