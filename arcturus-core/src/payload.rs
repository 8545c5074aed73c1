//! Payload metadata attached to vectors.
//!
//! Payloads live in the payload store, not in the tree. The search path only
//! sees them through [`PayloadStore`](crate::storage::PayloadStore) reads:
//! lazily for filter evaluation and once per surviving result.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// JSON-like metadata attached to a vector.
///
/// # Example
///
/// ```
/// use arcturus_core::Payload;
///
/// let payload = Payload::new()
///     .with_field("type", "x")
///     .with_field("year", 2024);
///
/// assert_eq!(payload.get_str("type"), Some("x"));
/// assert_eq!(payload.get_i64("year"), Some(2024));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload {
    data: HashMap<String, Value>,
}

impl Payload {
    /// Creates a new empty payload.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    /// Creates a payload from a HashMap.
    #[inline]
    pub fn from_map(data: HashMap<String, Value>) -> Self {
        Self { data }
    }

    /// Adds a field to the payload. Chainable.
    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Sets a field value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.data.insert(key.into(), value.into());
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    #[inline]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    #[inline]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(|v| v.as_i64())
    }

    #[inline]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(|v| v.as_f64())
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns the secondary index key of a field, if the field is present.
    pub fn index_key(&self, key: &str) -> Option<IndexKey> {
        self.data.get(key).map(IndexKey::from)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns an iterator over the payload fields.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    #[inline]
    pub fn into_inner(self) -> HashMap<String, Value> {
        self.data
    }
}

/// Hashable form of a payload field value, used to select a secondary index
/// entry.
///
/// JSON values are not `Hash`, so each one is tagged by its JSON type. Values
/// of different types never collide: `"7"` and `7` select different entries.
/// Numbers compare by value, so `7` and `7.0` select the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndexKey {
    Null,
    Bool(bool),
    /// Bit pattern of the number as `f64`, with `-0.0` folded into `0.0`.
    Num(u64),
    Str(String),
    /// Arrays and objects, by their JSON rendering.
    Other(String),
}

impl IndexKey {
    /// Key of a numeric field value.
    pub fn number(value: f64) -> Self {
        let value = if value == 0.0 { 0.0 } else { value };
        IndexKey::Num(value.to_bits())
    }
}

impl From<&Value> for IndexKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => IndexKey::Null,
            Value::Bool(b) => IndexKey::Bool(*b),
            Value::Number(n) => match n.as_f64() {
                Some(f) => IndexKey::number(f),
                None => IndexKey::Other(n.to_string()),
            },
            Value::String(s) => IndexKey::Str(s.clone()),
            _ => IndexKey::Other(value.to_string()),
        }
    }
}

impl From<Value> for IndexKey {
    fn from(value: Value) -> Self {
        IndexKey::from(&value)
    }
}

impl From<&str> for IndexKey {
    fn from(value: &str) -> Self {
        IndexKey::Str(value.to_string())
    }
}

impl From<String> for IndexKey {
    fn from(value: String) -> Self {
        IndexKey::Str(value)
    }
}

impl From<i64> for IndexKey {
    fn from(value: i64) -> Self {
        IndexKey::number(value as f64)
    }
}

impl From<f64> for IndexKey {
    fn from(value: f64) -> Self {
        IndexKey::number(value)
    }
}

impl From<bool> for IndexKey {
    fn from(value: bool) -> Self {
        IndexKey::Bool(value)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Null => f.write_str("null"),
            IndexKey::Bool(b) => write!(f, "{}", b),
            IndexKey::Num(bits) => write!(f, "{}", f64::from_bits(*bits)),
            IndexKey::Str(s) => write!(f, "{:?}", s),
            IndexKey::Other(raw) => f.write_str(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_with_field() {
        let p = Payload::new()
            .with_field("name", "test")
            .with_field("count", 42);

        assert_eq!(p.len(), 2);
        assert_eq!(p.get_str("name"), Some("test"));
        assert_eq!(p.get_i64("count"), Some(42));
        assert!(p.get_f64("missing").is_none());
    }

    #[test]
    fn test_payload_set_and_get() {
        let mut p = Payload::new();
        assert!(p.is_empty());
        p.set("key", "value");
        assert!(p.contains_key("key"));
        assert_eq!(p.get_str("key"), Some("value"));
    }

    #[test]
    fn test_payload_serializes_as_plain_object() {
        let p = Payload::new().with_field("type", "x");
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"type":"x"}"#);
        let back: Payload = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn test_index_key_keeps_json_types_apart() {
        let p = Payload::new()
            .with_field("s", "7")
            .with_field("n", 7)
            .with_field("f", 7.0)
            .with_field("b", true)
            .with_field("z", Value::Null);

        assert_eq!(p.index_key("s"), Some(IndexKey::from("7")));
        assert_eq!(p.index_key("n"), Some(IndexKey::from(7)));
        assert_ne!(p.index_key("s"), p.index_key("n"));
        assert_eq!(p.index_key("n"), p.index_key("f"));
        assert_eq!(p.index_key("b"), Some(IndexKey::from(true)));
        assert_ne!(p.index_key("b"), Some(IndexKey::from("true")));
        assert_eq!(p.index_key("z"), Some(IndexKey::Null));
        assert_ne!(p.index_key("z"), Some(IndexKey::from("null")));
        assert_eq!(p.index_key("missing"), None);
    }

    #[test]
    fn test_index_key_display() {
        assert_eq!(IndexKey::from("x").to_string(), "\"x\"");
        assert_eq!(IndexKey::from(7).to_string(), "7");
        assert_eq!(IndexKey::from(-0.0).to_string(), "0");
        assert_eq!(IndexKey::Null.to_string(), "null");
    }
}
