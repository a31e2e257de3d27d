use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value as JsonValue};

/// A scalar metadata value as supplied by the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    Number(Number),
    Bool(bool),
}

impl MetadataValue {
    /// Accepts JSON strings, numbers, and booleans; anything else is `None`.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::String(text) => Some(Self::Text(text.clone())),
            JsonValue::Number(number) => Some(Self::Number(number.clone())),
            JsonValue::Bool(flag) => Some(Self::Bool(*flag)),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Number(number) => match number.as_f64() {
                // 3.0 prints as "3", like the caller's JSON producer would.
                Some(float)
                    if number.is_f64() && float.fract() == 0.0 && float.abs() < 1e15 =>
                {
                    write!(f, "{}", float as i64)
                }
                _ => write!(f, "{number}"),
            },
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<u64> for MetadataValue {
    fn from(value: u64) -> Self {
        Self::Number(Number::from(value))
    }
}

/// One key/value pair of outgoing call metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: MetadataValue,
}

impl MetadataEntry {
    pub fn new(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self { key: key.into(), value: value.into() }
    }

    /// Case-insensitive key comparison.
    pub fn is(&self, key: &str) -> bool {
        self.key.eq_ignore_ascii_case(key)
    }

    /// Parses `{ "key": "...", "value": ... }`, returning `None` when malformed.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        let object = value.as_object()?;
        let key = object.get("key").and_then(JsonValue::as_str)?;
        let value = object.get("value").and_then(MetadataValue::from_json)?;
        Some(Self { key: key.to_owned(), value })
    }

    /// Parses either an array of entry objects or a `{ key: value }` map.
    /// Malformed entries are dropped; any other shape yields no entries.
    pub fn list_from_json(value: &JsonValue) -> Vec<Self> {
        match value {
            JsonValue::Array(items) => items.iter().filter_map(Self::from_json).collect(),
            JsonValue::Object(map) => map
                .iter()
                .filter_map(|(key, value)| {
                    MetadataValue::from_json(value).map(|value| Self { key: key.clone(), value })
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}
