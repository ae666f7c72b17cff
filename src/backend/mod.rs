//! Clients for the backing store.
//!
//! Everything above this module talks to a store through [`StoreClient`]:
//! send one command, get back its reply. Error replies (`-ERR ...`) come
//! back in-band as [`RespValue::Error`]; only transport failures surface as
//! [`StoreError`] from `call`.
//!
//! Two implementations ship with the crate:
//!
//! - [`RespConnection`]: RESP2 over any async byte stream, TCP in practice
//! - [`MemoryClient`]: an in-process client of the embedded store

pub mod memory;
pub mod resp;

pub use memory::MemoryClient;
pub use resp::RespConnection;

use crate::protocol::{ParseError, RespValue};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

/// Errors raised while talking to a store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Parse(#[from] ParseError),

    #[error("connection closed by the store")]
    Closed,

    /// The store answered with an error reply; the text is verbatim.
    #[error("{0}")]
    Reply(String),

    #[error("unexpected reply to {command}: {reply:?}")]
    UnexpectedReply { command: String, reply: RespValue },

    /// Requests and replies on the connection no longer line up.
    #[error("connection out of sync: {0}")]
    OutOfSync(String),
}

impl StoreError {
    /// True when the connection itself is unusable, as opposed to a single
    /// command having failed.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            StoreError::Io(_) | StoreError::Parse(_) | StoreError::Closed | StoreError::OutOfSync(_)
        )
    }

    pub(crate) fn unexpected(command: &str, reply: RespValue) -> Self {
        StoreError::UnexpectedReply {
            command: command.to_string(),
            reply,
        }
    }
}

/// A connection to one store instance.
///
/// Implementations keep per-connection state (the selected database), so a
/// client must not be shared between callers without serializing access.
pub trait StoreClient: Send {
    /// Sends one command and waits for its reply.
    fn call(
        &mut self,
        argv: Vec<Bytes>,
    ) -> impl Future<Output = Result<RespValue, StoreError>> + Send;

    /// Sends several commands and returns their replies in order.
    ///
    /// The default sends them one at a time; network clients override this
    /// to write the whole batch before reading.
    fn pipeline(
        &mut self,
        commands: Vec<Vec<Bytes>>,
    ) -> impl Future<Output = Result<Vec<RespValue>, StoreError>> + Send {
        async move {
            let mut replies = Vec::with_capacity(commands.len());
            for argv in commands {
                replies.push(self.call(argv).await?);
            }
            Ok(replies)
        }
    }
}

/// Where and how to reach a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Database checked at connect time.
    #[serde(default)]
    pub db: u32,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
            db: 0,
        }
    }

    /// Registry id of the connection: `host:port`.
    pub fn id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builds an argv from anything byte-like.
///
/// ```
/// use keyscope::backend::argv;
/// assert_eq!(argv(["SELECT", "3"]).len(), 2);
/// ```
pub fn argv<I, B>(parts: I) -> Vec<Bytes>
where
    I: IntoIterator<Item = B>,
    B: Into<Bytes>,
{
    parts.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id() {
        let config = ConnectionConfig::new("10.0.0.5", 6380);
        assert_eq!(config.id(), "10.0.0.5:6380");
    }

    #[test]
    fn test_config_from_json_defaults() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{"host":"localhost","port":6379}"#).unwrap();
        assert_eq!(config, ConnectionConfig::new("localhost", 6379));
    }

    #[test]
    fn test_transport_classification() {
        assert!(StoreError::Closed.is_transport());
        assert!(StoreError::Io(std::io::ErrorKind::BrokenPipe.into()).is_transport());
        assert!(!StoreError::Reply("ERR nope".into()).is_transport());
        assert!(!StoreError::unexpected("TTL", RespValue::Null).is_transport());
    }
}
