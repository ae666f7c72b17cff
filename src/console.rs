//! The operations a console front end calls.
//!
//! Every per-database operation resolves the connection, opens a
//! [`Session`] on the requested database and runs to completion inside it.
//! A transport failure anywhere in an operation ends that connection: it is
//! removed from the registry and [`ConsoleError::Connection`] is returned.

use crate::backend::{ConnectionConfig, RespConnection, StoreClient, StoreError};
use crate::codec::{decode, SetKeyRequest, ValueEnvelope, ValueType, WritePlan};
use crate::error::ConsoleError;
use crate::gateway;
use crate::protocol::RespValue;
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::scanner::{self, ScanCursor, ScanPage};
use crate::session::Session;
use crate::tree::{self, NamespaceNode};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Databases assumed when the store does not report its count.
pub const DEFAULT_DATABASES: u32 = 16;

/// One scan page reshaped as a namespace tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreePage {
    pub roots: Vec<NamespaceNode>,
    pub next_cursor: ScanCursor,
    pub has_more: bool,
}

pub struct Console<C> {
    registry: ConnectionRegistry<C>,
}

impl<C> Default for Console<C> {
    fn default() -> Self {
        Self {
            registry: ConnectionRegistry::new(),
        }
    }
}

impl Console<RespConnection<TcpStream>> {
    /// Opens a connection and registers it under `host:port`, replacing any
    /// earlier connection with that id.
    pub async fn connect(&self, config: &ConnectionConfig) -> Result<String, ConsoleError> {
        let connection = RespConnection::connect(config).await.map_err(|err| match err {
            // Rejected AUTH or SELECT still means no usable connection.
            StoreError::Reply(_) | StoreError::UnexpectedReply { .. } => ConsoleError::Connection(err),
            other => ConsoleError::from(other),
        })?;
        let id = config.id();
        self.register(id.clone(), connection);
        Ok(id)
    }
}

impl<C: StoreClient> Console<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ConnectionRegistry<C> {
        &self.registry
    }

    /// Registers an already-open client.
    pub fn register(&self, id: impl Into<String>, client: C) {
        let id = id.into();
        if self.registry.put(id.clone(), client).is_some() {
            info!(connection = %id, "Replaced connection");
        } else {
            info!(connection = %id, "Registered connection");
        }
    }

    pub fn disconnect(&self, id: &str) -> Result<(), ConsoleError> {
        self.registry
            .remove(id)
            .map(|_| info!(connection = %id, "Disconnected"))
            .ok_or_else(|| ConsoleError::UnknownConnection(id.to_string()))
    }

    pub fn connections(&self) -> Vec<String> {
        self.registry.ids()
    }

    /// Logical database indices, from `CONFIG GET databases` when the store
    /// answers it and `0..16` otherwise.
    pub async fn list_databases(&self, id: &str) -> Result<Vec<u32>, ConsoleError> {
        let handle = self.handle(id)?;
        let result = async {
            let mut session = Session::open(handle.client(), 0).await?;
            match session.config_get("databases").await {
                Ok(pairs) => Ok(pairs
                    .into_iter()
                    .find(|(name, _)| name == "databases")
                    .and_then(|(_, count)| count.parse().ok())
                    .unwrap_or(DEFAULT_DATABASES)),
                Err(err) if err.is_transport() => Err(err),
                Err(err) => {
                    debug!(connection = %id, error = %err, "CONFIG GET refused, assuming default");
                    Ok(DEFAULT_DATABASES)
                }
            }
        }
        .await
        .map_err(ConsoleError::from);

        let count = self.settle(&handle, result)?;
        Ok((0..count).collect())
    }

    /// One page of keys with their types and TTLs.
    pub async fn list_keys(
        &self,
        id: &str,
        db: u32,
        cursor: &ScanCursor,
        batch_size: usize,
        pattern: Option<&str>,
    ) -> Result<ScanPage, ConsoleError> {
        let handle = self.handle(id)?;
        let result = async {
            let mut session = Session::open(handle.client(), db).await?;
            scanner::scan(&mut session, cursor, batch_size, pattern).await
        }
        .await
        .map_err(ConsoleError::from);
        self.settle(&handle, result)
    }

    /// Every key in `db`, following the scan cursor to the end.
    pub async fn scan_all_keys(
        &self,
        id: &str,
        db: u32,
        batch_size: usize,
        pattern: Option<&str>,
    ) -> Result<Vec<scanner::KeyDescriptor>, ConsoleError> {
        let handle = self.handle(id)?;
        let result = async {
            let mut session = Session::open(handle.client(), db).await?;
            scanner::scan_all(&mut session, batch_size, pattern).await
        }
        .await
        .map_err(ConsoleError::from);
        self.settle(&handle, result)
    }

    /// Every key in `db`, listed with `KEYS`. See [`scanner::full_listing`].
    pub async fn list_all_keys(
        &self,
        id: &str,
        db: u32,
        pattern: &str,
    ) -> Result<Vec<scanner::KeyDescriptor>, ConsoleError> {
        let handle = self.handle(id)?;
        let result = async {
            let mut session = Session::open(handle.client(), db).await?;
            scanner::full_listing(&mut session, pattern).await
        }
        .await
        .map_err(ConsoleError::from);
        self.settle(&handle, result)
    }

    /// One page of keys grouped into a namespace tree.
    pub async fn key_tree(
        &self,
        id: &str,
        db: u32,
        cursor: &ScanCursor,
        batch_size: usize,
        pattern: Option<&str>,
    ) -> Result<TreePage, ConsoleError> {
        let page = self.list_keys(id, db, cursor, batch_size, pattern).await?;
        Ok(TreePage {
            roots: tree::build(&page.keys),
            next_cursor: page.next_cursor,
            has_more: page.has_more,
        })
    }

    /// Reads and decodes the value at `key`.
    pub async fn get_key(&self, id: &str, db: u32, key: &str) -> Result<ValueEnvelope, ConsoleError> {
        let handle = self.handle(id)?;
        let key = Bytes::from(key.to_string());
        let result = async {
            let mut session = Session::open(handle.client(), db).await?;
            let type_name = session.key_type(&key).await?;
            let value_type: ValueType = type_name.parse()?;
            let raw = session.read_value(value_type, &key).await?;
            Ok::<_, ConsoleError>(decode(raw))
        }
        .await;
        self.settle(&handle, result)
    }

    /// Replaces the value at `key`. The request is fully validated before
    /// anything is sent.
    pub async fn set_key(
        &self,
        id: &str,
        db: u32,
        key: &str,
        request: &SetKeyRequest,
    ) -> Result<(), ConsoleError> {
        let plan = WritePlan::for_request(key.to_string(), request)?;
        let handle = self.handle(id)?;
        let result = async {
            let mut session = Session::open(handle.client(), db).await?;
            apply(&mut session, plan).await
        }
        .await;
        self.settle(&handle, result)
    }

    pub async fn delete_key(&self, id: &str, db: u32, key: &str) -> Result<(), ConsoleError> {
        let handle = self.handle(id)?;
        let key = Bytes::from(key.to_string());
        let result = async {
            let mut session = Session::open(handle.client(), db).await?;
            let removed = session.delete(&key).await?;
            debug!(connection = %id, db, removed, "Deleted key");
            Ok::<_, StoreError>(())
        }
        .await
        .map_err(ConsoleError::from);
        self.settle(&handle, result)
    }

    /// Runs a raw command and returns its reply as JSON.
    pub async fn execute_command(
        &self,
        id: &str,
        db: u32,
        command: &str,
        args: &[String],
    ) -> Result<JsonValue, ConsoleError> {
        let handle = self.handle(id)?;
        let result = async {
            let mut session = Session::open(handle.client(), db).await?;
            gateway::execute(&mut session, command, args).await
        }
        .await
        .map(gateway::reply_to_json)
        .map_err(ConsoleError::from);
        self.settle(&handle, result)
    }

    fn handle(&self, id: &str) -> Result<Arc<ConnectionHandle<C>>, ConsoleError> {
        self.registry
            .get(id)
            .ok_or_else(|| ConsoleError::UnknownConnection(id.to_string()))
    }

    /// Drops the connection if `result` says it is dead.
    fn settle<T>(
        &self,
        handle: &Arc<ConnectionHandle<C>>,
        result: Result<T, ConsoleError>,
    ) -> Result<T, ConsoleError> {
        if let Err(err) = &result {
            if err.is_terminal() && self.registry.remove_handle(handle) {
                warn!(connection = %handle.id(), error = %err, "Dropped dead connection");
            }
        }
        result
    }
}

/// Sends the writes of `plan` in one pipeline, then its expiry.
async fn apply<C: StoreClient>(
    session: &mut Session<'_, C>,
    plan: WritePlan,
) -> Result<(), ConsoleError> {
    let writes = plan.writes.len();
    for reply in session.pipeline(plan.writes).await? {
        if let RespValue::Error(text) = reply {
            return Err(ConsoleError::Command(text));
        }
    }

    if let Some(expire) = plan.expire {
        match session.raw(expire).await {
            Ok(RespValue::Integer(1)) => {}
            Ok(RespValue::Integer(_)) => {
                return Err(ConsoleError::TtlApplication("key no longer exists".to_string()))
            }
            Ok(RespValue::Error(text)) => return Err(ConsoleError::TtlApplication(text)),
            Ok(other) => {
                return Err(ConsoleError::TtlApplication(format!("unexpected reply {:?}", other)))
            }
            Err(err) => return Err(ConsoleError::from(err)),
        }
    }

    debug!(db = session.db(), commands = writes, "Applied write plan");
    Ok(())
}
