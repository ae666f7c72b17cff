//! Turning a set request into store commands.

use crate::backend::argv;
use crate::codec::envelope::{ValueEnvelope, ValueType};
use crate::codec::scalar::encode_scalar;
use crate::codec::CodecError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Largest number of members (or field/value pairs) sent in one command.
pub const MAX_MEMBERS_PER_COMMAND: usize = 512;

/// What a consumer submits to replace a key's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetKeyRequest {
    #[serde(rename = "type")]
    pub value_type: String,
    pub value: JsonValue,
    /// Seconds; fractional and negative values are accepted and normalized.
    #[serde(default)]
    pub ttl: f64,
}

impl SetKeyRequest {
    pub fn new(value_type: impl Into<String>, value: JsonValue, ttl: f64) -> Self {
        Self {
            value_type: value_type.into(),
            value,
            ttl,
        }
    }
}

/// Floors and clamps a requested TTL to whole non-negative seconds.
/// `0` means no expiry.
pub fn ttl_seconds(ttl: f64) -> u64 {
    if ttl.is_nan() || ttl <= 0.0 {
        0
    } else {
        ttl.floor() as u64
    }
}

/// The commands that replace a key's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePlan {
    pub key: Bytes,
    /// Clear and populate, in order.
    pub writes: Vec<Vec<Bytes>>,
    /// Applied after `writes` succeed; `None` when there is nothing to expire.
    pub expire: Option<Vec<Bytes>>,
}

impl WritePlan {
    /// Builds the plan for a raw request: parses the type tag, checks the
    /// payload shape, and encodes every scalar. Nothing here touches a store,
    /// so a rejected request never leaves a partial write behind.
    pub fn for_request(key: impl Into<Bytes>, request: &SetKeyRequest) -> Result<Self, CodecError> {
        let value_type: ValueType = request.value_type.parse()?;
        let envelope = ValueEnvelope::from_parts(value_type, request.value.clone())?;
        Self::for_envelope(key, &envelope, ttl_seconds(request.ttl))
    }

    pub fn for_envelope(
        key: impl Into<Bytes>,
        envelope: &ValueEnvelope,
        ttl: u64,
    ) -> Result<Self, CodecError> {
        let key = key.into();
        let value_type = envelope.value_type();
        let encode = |value: &JsonValue| {
            encode_scalar(value).map_err(|reason| CodecError::Encoding { value_type, reason })
        };

        let (command, stride, members): (&'static str, usize, Vec<Bytes>) = match envelope {
            ValueEnvelope::String(value) => {
                let mut set = vec![Bytes::from("SET"), key.clone(), encode(value)?];
                if ttl > 0 {
                    set.push(Bytes::from("EX"));
                    set.push(Bytes::from(ttl.to_string()));
                }
                return Ok(WritePlan {
                    key,
                    writes: vec![set],
                    expire: None,
                });
            }
            ValueEnvelope::List(items) => {
                ("RPUSH", 1, items.iter().map(encode).collect::<Result<_, _>>()?)
            }
            ValueEnvelope::Set(items) => {
                ("SADD", 1, items.iter().map(encode).collect::<Result<_, _>>()?)
            }
            ValueEnvelope::Hash(fields) => {
                let mut flat = Vec::with_capacity(fields.len() * 2);
                for (field, value) in fields {
                    flat.push(Bytes::from(field.clone()));
                    flat.push(encode(value)?);
                }
                ("HSET", 2, flat)
            }
            ValueEnvelope::ZSet(entries) => {
                let mut flat = Vec::with_capacity(entries.len() * 2);
                for entry in entries {
                    flat.push(Bytes::from(format_score(entry.score)));
                    flat.push(encode(&entry.member)?);
                }
                ("ZADD", 2, flat)
            }
        };

        let mut writes = vec![vec![Bytes::from("DEL"), key.clone()]];
        for chunk in members.chunks(MAX_MEMBERS_PER_COMMAND * stride) {
            let mut cmd = Vec::with_capacity(chunk.len() + 2);
            cmd.push(Bytes::from(command));
            cmd.push(key.clone());
            cmd.extend_from_slice(chunk);
            writes.push(cmd);
        }

        // An empty collection leaves no key to expire.
        let expire = (ttl > 0 && !members.is_empty())
            .then(|| argv([Bytes::from("EXPIRE"), key.clone(), Bytes::from(ttl.to_string())]));

        Ok(WritePlan { key, writes, expire })
    }

    /// Every command of the plan, expiry last.
    pub fn commands(&self) -> impl Iterator<Item = &Vec<Bytes>> {
        self.writes.iter().chain(self.expire.iter())
    }
}

fn format_score(score: f64) -> String {
    if score == f64::INFINITY {
        "+inf".to_string()
    } else if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        score.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strings(cmd: &[Bytes]) -> Vec<String> {
        cmd.iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    #[test]
    fn test_ttl_normalization() {
        assert_eq!(ttl_seconds(0.0), 0);
        assert_eq!(ttl_seconds(-5.0), 0);
        assert_eq!(ttl_seconds(59.9), 59);
        assert_eq!(ttl_seconds(f64::NAN), 0);
    }

    #[test]
    fn test_request_from_json() {
        let request: SetKeyRequest =
            serde_json::from_value(json!({"type": "list", "value": ["a"]})).unwrap();
        assert_eq!(request.ttl, 0.0);
        assert_eq!(request.value_type, "list");
    }

    #[test]
    fn test_scalar_plan() {
        let plan = WritePlan::for_request("greeting", &SetKeyRequest::new("string", json!("hi"), 30.7))
            .unwrap();
        assert_eq!(plan.writes.len(), 1);
        assert_eq!(strings(&plan.writes[0]), ["SET", "greeting", "hi", "EX", "30"]);
        assert!(plan.expire.is_none());

        let plan = WritePlan::for_request("n", &SetKeyRequest::new("string", json!({"a": 1}), 0.0))
            .unwrap();
        assert_eq!(strings(&plan.writes[0]), ["SET", "n", "{\"a\":1}"]);
    }

    #[test]
    fn test_list_plan_clears_first() {
        let plan = WritePlan::for_request("l", &SetKeyRequest::new("list", json!(["x", "y"]), 10.0))
            .unwrap();
        assert_eq!(strings(&plan.writes[0]), ["DEL", "l"]);
        assert_eq!(strings(&plan.writes[1]), ["RPUSH", "l", "x", "y"]);
        assert_eq!(strings(plan.expire.as_ref().unwrap()), ["EXPIRE", "l", "10"]);
        assert_eq!(plan.commands().count(), 3);
    }

    #[test]
    fn test_hash_and_zset_plans() {
        let plan = WritePlan::for_request(
            "h",
            &SetKeyRequest::new("hash", json!({"name": "Ariz", "age": 30}), 0.0),
        )
        .unwrap();
        assert_eq!(strings(&plan.writes[1]), ["HSET", "h", "age", "30", "name", "Ariz"]);

        let plan = WritePlan::for_request(
            "z",
            &SetKeyRequest::new(
                "zset",
                json!([{"score": 1.5, "member": "a"}, {"score": "-inf", "member": {"k": 1}}]),
                0.0,
            ),
        )
        .unwrap();
        assert_eq!(
            strings(&plan.writes[1]),
            ["ZADD", "z", "1.5", "a", "-inf", "{\"k\":1}"]
        );
    }

    #[test]
    fn test_binary_members_are_decoded() {
        let plan = WritePlan::for_request(
            "s",
            &SetKeyRequest::new("set", json!([{"type": "binary", "data": "AP8="}]), 0.0),
        )
        .unwrap();
        assert_eq!(plan.writes[1][2], Bytes::from(&b"\x00\xff"[..]));
    }

    #[test]
    fn test_large_collections_are_chunked() {
        let items: Vec<_> = (0..1100).map(|i| json!(i)).collect();
        let plan = WritePlan::for_request("big", &SetKeyRequest::new("list", json!(items), 0.0))
            .unwrap();
        assert_eq!(plan.writes.len(), 4);
        assert_eq!(plan.writes[1].len(), 2 + 512);
        assert_eq!(plan.writes[3].len(), 2 + 1100 - 1024);

        let fields: serde_json::Map<_, _> = (0..600).map(|i| (format!("f{}", i), json!(i))).collect();
        let plan = WritePlan::for_request("bigh", &SetKeyRequest::new("hash", json!(fields), 0.0))
            .unwrap();
        assert_eq!(plan.writes.len(), 3);
        assert_eq!(plan.writes[1].len(), 2 + 1024);
    }

    #[test]
    fn test_empty_collection_only_clears() {
        let plan = WritePlan::for_request("e", &SetKeyRequest::new("set", json!([]), 60.0)).unwrap();
        assert_eq!(plan.writes.len(), 1);
        assert!(plan.expire.is_none());
    }

    #[test]
    fn test_rejections_before_any_command() {
        assert!(matches!(
            WritePlan::for_request("k", &SetKeyRequest::new("stream", json!([]), 0.0)),
            Err(CodecError::UnsupportedType(_))
        ));
        assert!(matches!(
            WritePlan::for_request("k", &SetKeyRequest::new("hash", json!(["x"]), 0.0)),
            Err(CodecError::Encoding { value_type: ValueType::Hash, .. })
        ));
        assert!(matches!(
            WritePlan::for_request(
                "k",
                &SetKeyRequest::new("list", json!([{"type": "binary", "data": "%%"}]), 0.0)
            ),
            Err(CodecError::Encoding { value_type: ValueType::List, .. })
        ));
    }
}
