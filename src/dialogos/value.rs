//! Tagged value type for [`crate::message::ProtocolMessage::body`].
//!
//! Message bodies are protocol-defined and not interpreted by the engine,
//! so rather than leak a dynamically typed map into the public API this
//! represents a body field as an explicit, JSON-interoperable variant type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single value inside a [`ProtocolMessage`](crate::message::ProtocolMessage) body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// The JSON `null` value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// Raw bytes, represented in JSON as a `{"$dialogos_bytes": "<base64>"}`
    /// object so the JSON form round-trips losslessly — the wrapper struct
    /// rejects any extra keys, so a [`Value::Map`] that merely happens to
    /// carry a `"$dialogos_bytes"` entry alongside other fields is never
    /// mistaken for one.
    Bytes(#[serde(with = "bytes_as_base64")] Vec<u8>),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A string-keyed map of values. `BTreeMap` so iteration order is
    /// deterministic for logging and golden-file tests.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Convenience constructor for a string value.
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Returns the inner string if this value is a [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the inner integer if this value is a [`Value::Int`].
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

mod bytes_as_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// `deny_unknown_fields` is load-bearing: under `#[serde(untagged)]` the
    /// enum tries this variant before `Map`, so without it a map carrying a
    /// `"$dialogos_bytes"` key alongside any other field would still match
    /// here and silently drop the rest of the map on deserialize.
    #[derive(Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Wrapper {
        #[serde(rename = "$dialogos_bytes")]
        bytes: String,
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        Wrapper {
            bytes: STANDARD.encode(bytes),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let wrapper = Wrapper::deserialize(deserializer)?;
        STANDARD.decode(&wrapper.bytes).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_value_round_trips_through_json() {
        let value = Value::Bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        let json = serde_json::to_value(&value).unwrap();
        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn map_value_round_trips_through_json() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::Int(1));
        map.insert("b".to_string(), Value::String("x".to_string()));
        let value = Value::Map(map);
        let json = serde_json::to_value(&value).unwrap();
        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn map_with_bytes_tag_key_is_not_swallowed_by_the_bytes_variant() {
        let mut map = BTreeMap::new();
        map.insert(
            "$dialogos_bytes".to_string(),
            Value::String("aGk=".to_string()),
        );
        map.insert("extra".to_string(), Value::Int(1));
        let value = Value::Map(map);

        let json = serde_json::to_value(&value).unwrap();
        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, value);
    }
}
