//! The uniform, JSON-safe shape of a stored value.

use crate::codec::CodecError;
use bytes::Bytes;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

/// The five value types the console understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    List,
    Set,
    Hash,
    #[serde(rename = "zset")]
    ZSet,
}

impl ValueType {
    pub const ALL: [ValueType; 5] = [
        ValueType::String,
        ValueType::List,
        ValueType::Set,
        ValueType::Hash,
        ValueType::ZSet,
    ];

    /// The tag used on the wire and by `TYPE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::List => "list",
            ValueType::Set => "set",
            ValueType::Hash => "hash",
            ValueType::ZSet => "zset",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValueType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CodecError::UnsupportedType(s.to_string()))
    }
}

/// A decoded value: `{"type": <tag>, "value": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ValueEnvelope {
    String(JsonValue),
    List(Vec<JsonValue>),
    Set(Vec<JsonValue>),
    Hash(Map<String, JsonValue>),
    #[serde(rename = "zset")]
    ZSet(Vec<ScoredMember>),
}

impl ValueEnvelope {
    pub fn value_type(&self) -> ValueType {
        match self {
            ValueEnvelope::String(_) => ValueType::String,
            ValueEnvelope::List(_) => ValueType::List,
            ValueEnvelope::Set(_) => ValueType::Set,
            ValueEnvelope::Hash(_) => ValueType::Hash,
            ValueEnvelope::ZSet(_) => ValueType::ZSet,
        }
    }

    /// Checks that `payload` has the JSON shape `value_type` requires.
    pub fn from_parts(value_type: ValueType, payload: JsonValue) -> Result<Self, CodecError> {
        let shape_error = |e: serde_json::Error| CodecError::Encoding {
            value_type,
            reason: e.to_string(),
        };
        Ok(match value_type {
            ValueType::String => ValueEnvelope::String(payload),
            ValueType::List => ValueEnvelope::List(serde_json::from_value(payload).map_err(shape_error)?),
            ValueType::Set => ValueEnvelope::Set(serde_json::from_value(payload).map_err(shape_error)?),
            ValueType::Hash => ValueEnvelope::Hash(serde_json::from_value(payload).map_err(shape_error)?),
            ValueType::ZSet => ValueEnvelope::ZSet(serde_json::from_value(payload).map_err(shape_error)?),
        })
    }
}

/// One sorted-set entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoredMember {
    #[serde(with = "score")]
    pub score: f64,
    pub member: JsonValue,
}

/// A value as read from the store, before per-scalar decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    String(Bytes),
    List(Vec<Bytes>),
    Set(Vec<Bytes>),
    Hash(Vec<(Bytes, Bytes)>),
    /// Members in the order the store ranked them.
    ZSet(Vec<(Bytes, f64)>),
}

/// Parses a score the way the store prints it: decimal, `inf`, `-inf`.
pub fn parse_score(text: &str) -> Option<f64> {
    match text {
        "inf" | "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        other => other.parse::<f64>().ok().filter(|f| f.is_finite()),
    }
}

/// Scores are JSON numbers; the infinities, which JSON cannot carry, travel
/// as the strings `"inf"` and `"-inf"`.
mod score {
    use super::*;

    pub fn serialize<S: Serializer>(score: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if score.is_infinite() {
            serializer.serialize_str(if *score > 0.0 { "inf" } else { "-inf" })
        } else {
            serializer.serialize_f64(*score)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(text) => parse_score(&text)
                .ok_or_else(|| de::Error::custom(format!("invalid score '{}'", text))),
        }
    }
}
