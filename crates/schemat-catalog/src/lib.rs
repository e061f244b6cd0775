//! Document model for Schemat.
//!
//! The unit of stored and edited data is the [`Catalog`]: an ordered
//! multimap whose keys may be missing or repeated and whose values are
//! [`Node`]s, a closed sum type over scalars, nested catalogs, ordered maps,
//! lists, and references to other items.
//!
//! # Modules
//!
//! - [`catalog`] -- the container itself plus path-based get/set/insert/delete/move
//! - [`walk`] -- generic descent, mutation, transform, and collect over any `Node`
//! - [`codec`] -- lossless JSON encoding (`encode`/`decode`, `dump`/`load`)
//! - [`path`] -- path steps and string path parsing

pub mod catalog;
pub mod codec;
pub mod error;
pub mod node;
pub mod path;
pub mod walk;

pub use catalog::{Catalog, Entry, IntoKey};
pub use codec::{decode_node, encode_node};
pub use error::{CatalogError, CatalogResult};
pub use node::{Node, Reference};
pub use path::{IntoPath, Step, SEPARATOR};
