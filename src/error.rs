//! Errors returned by [`Console`](crate::console::Console) operations.

use crate::backend::StoreError;
use crate::codec::{CodecError, ValueType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleError {
    /// The store is unreachable or the connection broke. The connection is
    /// dropped from the registry when this is returned.
    #[error("connection error: {0}")]
    Connection(#[source] StoreError),

    #[error("connection '{0}' not found")]
    UnknownConnection(String),

    #[error("unsupported value type '{0}'")]
    UnsupportedType(String),

    #[error("invalid {value_type} payload: {reason}")]
    Encoding { value_type: ValueType, reason: String },

    /// The value was written; only its expiry failed.
    #[error("value written but TTL not applied: {0}")]
    TtlApplication(String),

    /// The store rejected the command. The text is the store's own.
    #[error("{0}")]
    Command(String),
}

impl ConsoleError {
    /// True when the connection must be considered dead.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConsoleError::Connection(_))
    }
}

impl From<StoreError> for ConsoleError {
    fn from(err: StoreError) -> Self {
        match err {
            err if err.is_transport() => ConsoleError::Connection(err),
            StoreError::Reply(text) => ConsoleError::Command(text),
            other => ConsoleError::Command(other.to_string()),
        }
    }
}

impl From<CodecError> for ConsoleError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnsupportedType(name) => ConsoleError::UnsupportedType(name),
            CodecError::Encoding { value_type, reason } => {
                ConsoleError::Encoding { value_type, reason }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RespValue;

    #[test]
    fn test_store_error_mapping() {
        assert!(ConsoleError::from(StoreError::Closed).is_terminal());
        assert!(ConsoleError::from(StoreError::Io(std::io::ErrorKind::ConnectionReset.into()))
            .is_terminal());

        let err = ConsoleError::from(StoreError::Reply("WRONGTYPE nope".into()));
        assert!(!err.is_terminal());
        assert_eq!(err.to_string(), "WRONGTYPE nope");

        let err = ConsoleError::from(StoreError::unexpected("TTL", RespValue::Null));
        assert!(matches!(err, ConsoleError::Command(_)));
    }

    #[test]
    fn test_codec_error_mapping() {
        let err = ConsoleError::from(CodecError::UnsupportedType("stream".into()));
        assert_eq!(err.to_string(), "unsupported value type 'stream'");
        assert!(!err.is_terminal());
    }
}
