//! Dynamically-typed keys and values stored in a session.
//!
//! Session data is a map from [`Key`] to [`Value`]. Both are closed sets of
//! variants so that the [`Codec`](crate::Codec) can describe every value it
//! writes, and so that user-defined records go through an explicit
//! registration step before they can be persisted.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Data held by a single session.
pub type SessionValues = HashMap<Key, Value>;

/// A session data key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    /// Whether this key is the empty string, which stands for "no key".
    pub fn is_absent(&self) -> bool {
        matches!(self, Key::Str(s) if s.is_empty())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Key::Int(i64::from(i))
    }
}

/// A user-defined record: a registered type name plus named fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    /// Create an empty record of the given type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// A dynamically-typed session value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(#[serde(with = "float_repr")] f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(#[serde(with = "key_pairs")] BTreeMap<Key, Value>),
    Record(Record),
}

impl Value {
    /// Registration name of this value's concrete type.
    ///
    /// Records report their own type name; everything else reports one of
    /// the built-in kinds.
    pub fn kind(&self) -> &str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Record(r) => &r.type_name,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<Key, Value>> for Value {
    fn from(map: BTreeMap<Key, Value>) -> Self {
        Value::Map(map)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

/// Maps are written as `[key, value]` pairs; JSON object keys could only
/// hold strings.
mod key_pairs {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::{Key, Value};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<Key, Value>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<Key, Value>, D::Error> {
        let pairs = Vec::<(Key, Value)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

/// Finite floats are plain numbers; NaN and the infinities, which JSON
/// cannot carry, are spelled out as strings.
mod float_repr {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Special(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_sign_positive() {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(f) => Ok(f),
            Repr::Special(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("invalid float '{other}'"))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_key() {
        assert!(Key::from("").is_absent());
        assert!(!Key::from("user").is_absent());
        assert!(!Key::from(0).is_absent());
    }

    #[test]
    fn test_key_ordering_puts_ints_first() {
        let mut keys = vec![Key::from("b"), Key::from(2), Key::from("a"), Key::from(1)];
        keys.sort();
        assert_eq!(
            keys,
            vec![Key::from(1), Key::from(2), Key::from("a"), Key::from("b")]
        );
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Value::Nil.kind(), "nil");
        assert_eq!(Value::from("x").kind(), "string");
        assert_eq!(Value::from(vec![Value::Nil]).kind(), "list");
        let record = Record::new("Profile").with_field("user", "alice");
        assert_eq!(Value::from(record).kind(), "Profile");
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::from(7).as_int(), Some(7));
        assert_eq!(Value::from("7").as_int(), None);
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(1.5).as_float(), Some(1.5));
        assert_eq!(Value::from("hi").as_str(), Some("hi"));

        let record = Record::new("Profile").with_field("score", 3);
        let value = Value::from(record);
        let fields = value.as_record().unwrap();
        assert_eq!(fields.field("score"), Some(&Value::Int(3)));
    }
}
