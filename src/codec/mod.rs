//! Value codec: native store values to and from [`ValueEnvelope`]s.
//!
//! ```text
//!  RawValue ──decode──► ValueEnvelope (JSON) ──WritePlan──► DEL + RPUSH/SADD/HSET/ZADD [+ EXPIRE]
//!                                                          or SET [EX]
//! ```
//!
//! Decoding classifies every scalar separately (see [`scalar`]); encoding
//! checks the whole payload before producing any command.
//!
//! ```
//! use keyscope::codec::{decode, RawValue, ValueEnvelope};
//! use bytes::Bytes;
//! use serde_json::json;
//!
//! let envelope = decode(RawValue::String(Bytes::from("42")));
//! assert_eq!(envelope, ValueEnvelope::String(json!(42)));
//! ```

pub mod envelope;
pub mod plan;
pub mod scalar;

pub use envelope::{parse_score, RawValue, ScoredMember, ValueEnvelope, ValueType};
pub use plan::{ttl_seconds, SetKeyRequest, WritePlan, MAX_MEMBERS_PER_COMMAND};
pub use scalar::{decode_scalar, encode_scalar, is_binary, BinaryBlob};

use bytes::Bytes;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use tracing::warn;

/// Errors raised while decoding or encoding values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported value type '{0}'")]
    UnsupportedType(String),

    #[error("invalid {value_type} payload: {reason}")]
    Encoding { value_type: ValueType, reason: String },
}

/// Decodes a value read from the store.
pub fn decode(raw: RawValue) -> ValueEnvelope {
    match raw {
        RawValue::String(body) => ValueEnvelope::String(decode_scalar(&body)),
        RawValue::List(items) => ValueEnvelope::List(items.iter().map(|i| decode_scalar(i)).collect()),
        RawValue::Set(members) => ValueEnvelope::Set(members.iter().map(|m| decode_scalar(m)).collect()),
        RawValue::Hash(fields) => ValueEnvelope::Hash(decode_fields(fields)),
        RawValue::ZSet(entries) => ValueEnvelope::ZSet(
            entries
                .into_iter()
                .map(|(member, score)| ScoredMember {
                    score,
                    member: decode_scalar(&member),
                })
                .collect(),
        ),
    }
}

/// Field names are decoded as lossy UTF-8. Store fields are unique, so a
/// repeated name means two non-UTF-8 names collapsed into one; the later
/// value is kept.
fn decode_fields(fields: Vec<(Bytes, Bytes)>) -> Map<String, JsonValue> {
    let mut map = Map::new();
    for (field, value) in fields {
        let name = String::from_utf8_lossy(&field).into_owned();
        if map.contains_key(&name) {
            warn!(
                field = %name,
                raw = ?field,
                "Hash field names collide after UTF-8 decoding, earlier value dropped"
            );
        }
        map.insert(name, decode_scalar(&value));
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn b(s: &[u8]) -> Bytes {
        Bytes::copy_from_slice(s)
    }

    #[test]
    fn test_decode_each_element_separately() {
        let envelope = decode(RawValue::List(vec![
            b(b"plain"),
            b(b"{\"n\":1}"),
            b(b"\x00\x10"),
        ]));
        assert_eq!(
            envelope,
            ValueEnvelope::List(vec![
                json!("plain"),
                json!({"n": 1}),
                json!({"type": "binary", "data": "ABA="}),
            ])
        );
    }

    #[test]
    fn test_decode_hash_and_zset() {
        let envelope = decode(RawValue::Hash(vec![
            (b(b"name"), b(b"Ariz")),
            (b(b"age"), b(b"30")),
        ]));
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"type": "hash", "value": {"name": "Ariz", "age": 30}})
        );

        let envelope = decode(RawValue::ZSet(vec![
            (b(b"low"), -1.25),
            (b(b"[1,2]"), 1e300),
        ]));
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"type": "zset", "value": [
                {"score": -1.25, "member": "low"},
                {"score": 1e300, "member": [1, 2]},
            ]})
        );
    }

    #[test]
    fn test_invalid_utf8_field_names_are_lossy() {
        let envelope = decode(RawValue::Hash(vec![(b(b"f\xff"), b(b"v"))]));
        let ValueEnvelope::Hash(fields) = envelope else {
            panic!("expected a hash");
        };
        assert!(fields.contains_key("f\u{fffd}"));
    }

    #[test]
    fn test_colliding_field_names_keep_later_value() {
        let envelope = decode(RawValue::Hash(vec![
            (b(b"f\xff"), b(b"first")),
            (b(b"ok"), b(b"1")),
            (b(b"f\xfe"), b(b"second")),
        ]));
        let ValueEnvelope::Hash(fields) = envelope else {
            panic!("expected a hash");
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["f\u{fffd}"], json!("second"));
        assert_eq!(fields["ok"], json!(1));
    }

    #[test]
    fn test_decode_is_a_fixed_point_of_encode() {
        let raws = [
            RawValue::String(b(b"42")),
            RawValue::String(b(b"\x89PNG\r\n\x1a\n")),
            RawValue::List(vec![b(b"x"), b(b"\xfe"), b(b"null")]),
            RawValue::Set(vec![b(b"a b"), b(b"[true]")]),
            RawValue::Hash(vec![(b(b"bin"), b(b"\x01")), (b(b"txt"), b(b"t"))]),
            RawValue::ZSet(vec![(b(b"m\x00"), 2.0), (b(b"m"), f64::INFINITY)]),
        ];

        for raw in raws {
            let envelope = decode(raw.clone());
            let plan = WritePlan::for_envelope("k", &envelope, 0).unwrap();
            let written: Vec<Bytes> = plan
                .writes
                .last()
                .unwrap()
                .iter()
                .skip(2)
                .cloned()
                .collect();

            let reread = match &raw {
                RawValue::String(_) => RawValue::String(written[0].clone()),
                RawValue::List(_) => RawValue::List(written),
                RawValue::Set(_) => RawValue::Set(written),
                RawValue::Hash(_) => RawValue::Hash(
                    written.chunks(2).map(|p| (p[0].clone(), p[1].clone())).collect(),
                ),
                RawValue::ZSet(_) => RawValue::ZSet(
                    written
                        .chunks(2)
                        .map(|p| (p[1].clone(), parse_score(std::str::from_utf8(&p[0]).unwrap()).unwrap()))
                        .collect(),
                ),
            };
            assert_eq!(decode(reread), envelope);
        }
    }
}
