use thiserror::Error;
use uuid::Uuid;

use schemat_catalog::{CatalogError, Reference};
use schemat_db::DbError;
use schemat_types::ItemId;

#[derive(Debug, Error)]
pub enum TxError {
    /// Two different in-memory copies of one item both carry edits.
    #[error("conflicting edited copies staged for item {0}")]
    Conflict(ItemId),

    /// Staging into a committed transaction.
    #[error("transaction {0} is closed")]
    Closed(Uuid),

    /// A save named an item that is not staged.
    #[error("item not staged: {0:?}")]
    NotStaged(Reference),

    /// The remote end of a client sink failed or answered nonsense.
    #[error("remote action failed: {0}")]
    Remote(String),

    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TxError {
    fn from(e: serde_json::Error) -> Self {
        TxError::Serialization(e.to_string())
    }
}

pub type TxResult<T> = Result<T, TxError>;
