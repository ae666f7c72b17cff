//! Raw command passthrough.
//!
//! Sends whatever the operator typed, unvalidated, on the session's
//! database, and converts the reply to JSON. Nothing is cached on this path
//! and nothing is invalidated, so callers re-scan after a mutating command.

use crate::backend::{StoreClient, StoreError};
use crate::codec::BinaryBlob;
use crate::protocol::RespValue;
use crate::session::Session;
use bytes::Bytes;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

/// Runs `command args...` and returns the reply. An error reply from the
/// store comes back as [`StoreError::Reply`] with the store's text.
pub async fn execute<C: StoreClient>(
    session: &mut Session<'_, C>,
    command: &str,
    args: &[String],
) -> Result<RespValue, StoreError> {
    let mut argv = Vec::with_capacity(args.len() + 1);
    argv.push(Bytes::from(command.to_string()));
    argv.extend(args.iter().map(|arg| Bytes::from(arg.clone())));

    debug!(db = session.db(), command, args = args.len(), "Executing raw command");
    session.command(argv).await
}

/// Converts a reply to JSON.
///
/// Integers become numbers, strings become strings, nil becomes `null` and
/// arrays keep their nesting. Bulk strings that are not UTF-8 become a
/// binary blob; error replies nested in an array become `{"error": text}`.
pub fn reply_to_json(reply: RespValue) -> JsonValue {
    match reply {
        RespValue::SimpleString(s) => JsonValue::String(s),
        RespValue::Error(message) => json!({ "error": message }),
        RespValue::Integer(n) => JsonValue::from(n),
        RespValue::BulkString(bytes) => match std::str::from_utf8(&bytes) {
            Ok(text) => JsonValue::String(text.to_string()),
            Err(_) => BinaryBlob(bytes).to_json(),
        },
        RespValue::Null => JsonValue::Null,
        RespValue::Array(items) => JsonValue::Array(items.into_iter().map(reply_to_json).collect()),
    }
}
