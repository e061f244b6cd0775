use thiserror::Error;

use schemat_catalog::CatalogError;
use schemat_store::StoreError;
use schemat_types::ItemId;

/// Errors raised by rings and the database facade.
#[derive(Debug, Error)]
pub enum DbError {
    /// No ring holds the requested id.
    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    /// A write was directed at a read-only ring, or the record only exists in
    /// read-only rings and nothing above accepts it.
    #[error("read-only: {0}")]
    ReadOnly(String),

    /// The id lies outside the ring's `[start_id, stop_id)` range, or the
    /// autoincrement counter ran past `stop_id`.
    #[error("invalid id {id} for ring {ring}: {reason}")]
    InvalidId {
        id: ItemId,
        ring: String,
        reason: String,
    },

    /// An insert with an explicit id hit an existing record.
    #[error("item {0} already exists")]
    ItemExists(ItemId),

    /// A record could not be read or moved.
    #[error("data access error: {0}")]
    DataAccess(String),

    /// No ring in the stack accepts the insert.
    #[error("no writable ring accepts insert of {}", .0.map(|id| id.to_string()).unwrap_or_else(|| "new item".into()))]
    NotInsertable(Option<ItemId>),

    /// No ring carries an index with this name.
    #[error("index not found: {0}")]
    IndexNotFound(String),

    /// No ring has this name.
    #[error("ring not found: {0}")]
    RingNotFound(String),

    /// The database configuration is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for DbError {
    fn from(e: bincode::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

/// Result alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
