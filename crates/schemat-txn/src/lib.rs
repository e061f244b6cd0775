//! Transactions for Schemat.
//!
//! A [`Transaction`] stages in-memory [`Item`]s and pushes them to a
//! [`TxSink`] in one `save`:
//!
//! - newborn items are staged under provisional ids and inserted first;
//! - references to them are then rewritten to the ids they received;
//! - edited items are written as total-overwrite edits.
//!
//! Server-side transactions write to a [`schemat_db::Database`] directly
//! and may `commit`. Client-side transactions go through a [`RemoteSink`]
//! and cannot close themselves.

pub mod error;
pub mod item;
pub mod sink;
pub mod transaction;

pub use error::{TxError, TxResult};
pub use item::Item;
pub use sink::{serve_action, ActionRequest, ActionResponse, RemoteAction, RemoteSink, ServerSink, TxSink};
pub use transaction::Transaction;
