//! Layered ring database for Schemat.
//!
//! A [`Database`] is a stack of [`Ring`]s, each an id-range partition
//! `[start_id, stop_id)` over one physical block. Lower rings typically hold
//! read-only system records; upper rings hold application data.
//!
//! # Forwarding
//!
//! - `select` and `delete` probe rings from the top down.
//! - `insert` targets the outermost ring that accepts the id.
//! - `update` reads from the topmost ring holding the record and saves to
//!   that ring or the nearest one above it that accepts the id, so edits to
//!   read-only records land in an upper ring and shadow the original.
//!
//! Changes are expressed as serializable [`Edit`]s, applied as pure
//! functions of the stored data.

pub mod config;
pub mod database;
pub mod edit;
pub mod error;
mod flush;
pub mod index;
mod merge;
pub mod ring;

pub use config::{DatabaseConfig, RingDescriptor, DEFAULT_FLUSH_DELAY_MS};
pub use database::{Database, MoveOutcome};
pub use edit::{apply_all, Edit};
pub use error::{DbError, DbResult};
pub use index::{
    encode_value, FieldIndexer, IndexDelta, IndexDescriptor, IndexHit, IndexRange, Indexer, RingIndex,
};
pub use ring::Ring;
