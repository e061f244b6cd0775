//! Physical storage blocks for Schemat rings.
//!
//! A block is a byte-keyed, byte-valued store with ordered range scans. Each
//! ring persists its records through exactly one block; secondary indexes
//! use their own volatile blocks.
//!
//! # Backends
//!
//! All backends implement the [`Block`] trait:
//!
//! - [`MemoryBlock`] -- `BTreeMap`-based block for volatile rings and indexes
//! - [`FileBlock`] -- line-per-record text file, loaded on open and rewritten
//!   on flush
//!
//! # Design Rules
//!
//! 1. Keys compare byte-lexicographically; scans return ascending keys.
//! 2. Writes land in memory first; `flush` is the only point of physical I/O.
//! 3. The block never interprets values beyond what its file format needs.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::FileBlock;
pub use memory::MemoryBlock;
pub use traits::{Block, KeyValue};
