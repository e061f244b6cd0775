//! Where a transaction's writes go.
//!
//! A server-side transaction writes straight into a [`Database`]; a
//! client-side one ships each write through a [`RemoteAction`] transport to
//! a server that runs [`serve_action`]. Only server-side sinks implement
//! [`ServerSink`], and only transactions over those can commit.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use schemat_db::{Database, Edit};
use schemat_types::{ItemId, Record};

use crate::error::{TxError, TxResult};

/// Destination of transaction writes.
#[async_trait]
pub trait TxSink: Send + Sync {
    /// Store a new record and return its id.
    async fn insert(&self, data: Value) -> TxResult<ItemId>;

    /// Apply `edits` to an existing record and return the stored result.
    async fn update(&self, id: ItemId, edits: Vec<Edit>) -> TxResult<Record>;
}

/// Marker for sinks that write to the database in-process.
pub trait ServerSink: TxSink {}

#[async_trait]
impl TxSink for Database {
    async fn insert(&self, data: Value) -> TxResult<ItemId> {
        Ok(Database::insert(self, None, data).await?)
    }

    async fn update(&self, id: ItemId, edits: Vec<Edit>) -> TxResult<Record> {
        Ok(Database::update(self, id, &edits).await?)
    }
}

impl ServerSink for Database {}

#[async_trait]
impl<T: TxSink + ?Sized> TxSink for Arc<T> {
    async fn insert(&self, data: Value) -> TxResult<ItemId> {
        (**self).insert(data).await
    }

    async fn update(&self, id: ItemId, edits: Vec<Edit>) -> TxResult<Record> {
        (**self).update(id, edits).await
    }
}

impl<T: ServerSink + ?Sized> ServerSink for Arc<T> {}

// ---------------------------------------------------------------
// Client side
// ---------------------------------------------------------------

/// A write request sent from a client transaction to the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRequest {
    Insert { data: Value },
    Update { id: ItemId, edits: Vec<Edit> },
}

/// Records the server acknowledged for a request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub records: Vec<Record>,
}

/// Transport carrying [`ActionRequest`]s to a server.
#[async_trait]
pub trait RemoteAction: Send + Sync {
    async fn call(&self, request: ActionRequest) -> TxResult<ActionResponse>;
}

/// Client-side sink: every write is a remote action call.
pub struct RemoteSink<T> {
    transport: T,
}

impl<T: RemoteAction> RemoteSink<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    fn single(response: ActionResponse) -> TxResult<Record> {
        let mut records = response.records.into_iter();
        match (records.next(), records.next()) {
            (Some(record), None) => Ok(record),
            (None, _) => Err(TxError::Remote("empty response".into())),
            (Some(_), Some(_)) => Err(TxError::Remote("expected exactly one record".into())),
        }
    }
}

#[async_trait]
impl<T: RemoteAction> TxSink for RemoteSink<T> {
    async fn insert(&self, data: Value) -> TxResult<ItemId> {
        let response = self.transport.call(ActionRequest::Insert { data }).await?;
        Ok(Self::single(response)?.id)
    }

    async fn update(&self, id: ItemId, edits: Vec<Edit>) -> TxResult<Record> {
        let response = self.transport.call(ActionRequest::Update { id, edits }).await?;
        Self::single(response)
    }
}

/// Execute a client request against the database.
pub async fn serve_action(db: &Database, request: ActionRequest) -> TxResult<ActionResponse> {
    let record = match request {
        ActionRequest::Insert { data } => {
            let id = db.insert(None, data.clone()).await?;
            debug!(id = %id, "remote insert");
            Record::new(id, data)
        }
        ActionRequest::Update { id, edits } => {
            debug!(id = %id, edits = edits.len(), "remote update");
            db.update(id, &edits).await?
        }
    };
    Ok(ActionResponse {
        records: vec![record],
    })
}
