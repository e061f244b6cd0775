use schemat_types::{ItemId, TypeError};

/// Errors from block operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A line of a block file could not be parsed.
    #[error("corrupt block file {path} at line {line}: {reason}")]
    Corrupt {
        path: String,
        line: usize,
        reason: String,
    },

    /// A loaded record lies outside the bounds the block was opened with.
    #[error("id {id} outside block bounds [{start}, {stop})")]
    OutOfBounds { id: ItemId, start: String, stop: String },

    /// The same id occurs twice in a block file.
    #[error("duplicate id {0} in block file")]
    DuplicateId(ItemId),

    /// A key does not decode as an item id.
    #[error("invalid key {key}: {source}")]
    InvalidKey { key: String, source: TypeError },
}

/// Result alias for block operations.
pub type StoreResult<T> = Result<T, StoreError>;
