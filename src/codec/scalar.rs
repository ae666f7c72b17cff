//! Per-scalar conversion between stored bytes and JSON.
//!
//! Every scalar the store hands back (a string body, a list element, a set
//! member, a hash value, a sorted-set member) is decoded on its own:
//!
//! 1. bytes that parse as JSON become that JSON value;
//! 2. otherwise bytes that are all printable ASCII (`0x20..=0x7E`) become a
//!    JSON string;
//! 3. anything else becomes a [`BinaryBlob`], `{"type":"binary","data":"<base64>"}`.
//!
//! Encoding reverses it: strings are written verbatim, blobs are written as
//! their decoded bytes, any other JSON is written as its serialization.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use serde_json::{json, Value as JsonValue};

/// Raw bytes that are not text, carried through JSON as base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryBlob(pub Bytes);

impl BinaryBlob {
    const TAG: &'static str = "binary";

    pub fn to_json(&self) -> JsonValue {
        json!({ "type": Self::TAG, "data": BASE64.encode(&self.0) })
    }

    /// Recognizes the blob shape: an object with exactly `type: "binary"` and
    /// a string `data`. Returns `None` for anything else, and an error when
    /// the shape matches but `data` is not valid base64.
    pub fn from_json(value: &JsonValue) -> Option<Result<Self, String>> {
        let obj = value.as_object()?;
        if obj.len() != 2 || obj.get("type")?.as_str()? != Self::TAG {
            return None;
        }
        let data = obj.get("data")?.as_str()?;
        Some(
            BASE64
                .decode(data)
                .map(|bytes| BinaryBlob(Bytes::from(bytes)))
                .map_err(|e| format!("invalid base64 in binary value: {}", e)),
        )
    }
}

/// True when any byte falls outside printable ASCII.
///
/// Multi-byte UTF-8 text counts as binary here.
pub fn is_binary(raw: &[u8]) -> bool {
    raw.iter().any(|b| !(32..=126).contains(b))
}

/// Decodes one stored scalar into JSON.
pub fn decode_scalar(raw: &[u8]) -> JsonValue {
    if let Ok(parsed) = serde_json::from_slice::<JsonValue>(raw) {
        return parsed;
    }
    if is_binary(raw) {
        BinaryBlob(Bytes::copy_from_slice(raw)).to_json()
    } else {
        // Printable ASCII is valid UTF-8.
        JsonValue::String(String::from_utf8_lossy(raw).into_owned())
    }
}

/// Encodes one JSON scalar into the bytes to store.
pub fn encode_scalar(value: &JsonValue) -> Result<Bytes, String> {
    match value {
        JsonValue::String(s) => Ok(Bytes::from(s.clone())),
        other => match BinaryBlob::from_json(other) {
            Some(blob) => blob.map(|b| b.0),
            None => serde_json::to_vec(other)
                .map(Bytes::from)
                .map_err(|e| e.to_string()),
        },
    }
}
