//! Error types for the catalog crate.

/// Errors from catalog and tree operations.
///
/// Lookups never produce errors: a missing key, an index out of range, or a
/// step of the wrong kind for the container simply yields "not found". These
/// variants are for mutations and decoding, where the caller asked for
/// something that cannot be done.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// An intermediate step of a mutation path does not resolve.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// The path resolves to a scalar or reference where a container is needed.
    #[error("not a container at: {0}")]
    NotAContainer(String),

    /// A positional argument falls outside the container.
    #[error("position {pos} out of range for length {len}")]
    OutOfRange { pos: usize, len: usize },

    /// The operation is not meaningful with the given arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The encoded form is malformed.
    #[error("decode error: {0}")]
    Decode(String),

    /// A provisional reference survived until encoding.
    #[error("unresolved provisional reference: {0}")]
    UnresolvedReference(u64),

    /// JSON text could not be produced or parsed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for catalog results.
pub type CatalogResult<T> = Result<T, CatalogError>;
