use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Typed value tree exchanged between protocol codecs and operation handlers.
///
/// A `Value` is always interpreted against a [`Shape`](crate::Shape): the
/// codecs produce values that conform to an operation's input shape, and
/// handlers return values that conform to its output shape. Structures and
/// maps both use `BTreeMap` so that encoding order is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 string (also used for enum-constrained strings).
    String(String),
    /// Signed integer, used for both `integer` and `long` shapes.
    Integer(i64),
    /// Floating point number, used for both `float` and `double` shapes.
    Float(f64),
    /// Boolean flag.
    Boolean(bool),
    /// Raw bytes. Base64-encoded on text wire formats.
    Blob(Vec<u8>),
    /// Point in time, always normalised to UTC.
    Timestamp(DateTime<Utc>),
    /// Ordered sequence of values of the list's member shape.
    List(Vec<Value>),
    /// Key-unique mapping of the map's value shape.
    Map(BTreeMap<String, Value>),
    /// Named-field record. Absent optional members are simply not present.
    Structure(BTreeMap<String, Value>),
}

impl Value {
    /// Creates an empty structure.
    #[must_use]
    pub fn empty_structure() -> Self {
        Self::Structure(BTreeMap::new())
    }

    /// Builds a structure from `(member, value)` pairs.
    pub fn structure<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::Structure(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Builds a map from `(key, value)` pairs.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns the member of a structure (or entry of a map) with the given name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Structure(fields) | Self::Map(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Returns the fields of a structure.
    #[must_use]
    pub fn as_structure(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Structure(fields) => Some(fields),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short name of the variant, used in codec error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::Blob(_) => "blob",
            Self::Timestamp(_) => "timestamp",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Structure(_) => "structure",
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structure_builder_collects_fields() {
        let value = Value::structure([("FieldA", Value::from("X")), ("FieldB", Value::from(2))]);
        assert_eq!(value.get("FieldA").and_then(Value::as_str), Some("X"));
        assert_eq!(value.get("FieldB").and_then(Value::as_i64), Some(2));
        assert!(value.get("Missing").is_none());
    }

    #[test]
    fn get_on_scalar_returns_none() {
        assert!(Value::from("plain").get("anything").is_none());
    }

    #[test]
    fn map_and_structure_are_distinct() {
        let fields = [("k", Value::from(true))];
        assert_ne!(Value::map(fields.clone()), Value::structure(fields));
    }

    #[test]
    fn kind_names_every_variant() {
        assert_eq!(Value::from(1.5).kind(), "float");
        assert_eq!(Value::from(vec![1u8]).kind(), "blob");
        assert_eq!(Value::List(Vec::new()).kind(), "list");
        assert_eq!(Value::empty_structure().kind(), "structure");
    }
}
