//! Foundation types for Schemat.
//!
//! Every other Schemat crate depends on `schemat-types`.
//!
//! # Key Types
//!
//! - [`ItemId`] -- flat integer identifier of a persisted item
//! - [`IdRange`] -- half-open id range used by scans
//! - [`Record`] -- `{id, data}` pair as stored in a ring

pub mod error;
pub mod id;
pub mod record;

pub use error::TypeError;
pub use id::{IdRange, ItemId, KEY_LEN};
pub use record::Record;
