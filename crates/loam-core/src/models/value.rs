//! Structured record payloads

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Leaf values of a record tree
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// JSON `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Number, kept in its JSON representation so integers stay exact
    Number(serde_json::Number),
    /// String
    String(String),
}

/// A record payload: an unordered tree of named fields.
///
/// Serializes as plain JSON. Object keys are kept sorted, so the compact JSON
/// rendering doubles as the canonical serialization used for structural
/// equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    /// Leaf value
    Scalar(Scalar),
    /// Ordered list of values
    Array(Vec<Value>),
    /// Nested object
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// The `null` value
    #[must_use]
    pub const fn null() -> Self {
        Self::Scalar(Scalar::Null)
    }

    /// An empty object
    #[must_use]
    pub const fn object() -> Self {
        Self::Object(BTreeMap::new())
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Scalar::Null))
    }

    /// Null, empty string, empty array or empty object.
    #[must_use]
    pub fn is_trivial(&self) -> bool {
        match self {
            Self::Scalar(Scalar::Null) => true,
            Self::Scalar(Scalar::String(value)) => value.is_empty(),
            Self::Scalar(_) => false,
            Self::Array(items) => items.is_empty(),
            Self::Object(fields) => fields.is_empty(),
        }
    }

    #[must_use]
    pub const fn as_object(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, Self>> {
        match self {
            Self::Object(fields) => Some(fields),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::String(value)) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Scalar(Scalar::Number(number)) => number.as_i64(),
            _ => None,
        }
    }

    /// Look up a field of an object value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        self.as_object().and_then(|fields| fields.get(key))
    }

    /// Compact JSON with sorted object keys.
    #[must_use]
    pub fn canonical_string(&self) -> String {
        serde_json::Value::from(self.clone()).to_string()
    }

    /// Two values are structurally equal iff their canonical serializations match.
    #[must_use]
    pub fn structurally_eq(&self, other: &Self) -> bool {
        self == other || self.canonical_string() == other.canonical_string()
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_string())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Scalar(Scalar::Null),
            serde_json::Value::Bool(flag) => Self::Scalar(Scalar::Bool(flag)),
            serde_json::Value::Number(number) => Self::Scalar(Scalar::Number(number)),
            serde_json::Value::String(text) => Self::Scalar(Scalar::String(text)),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(fields) => Self::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Scalar(Scalar::Null) => Self::Null,
            Value::Scalar(Scalar::Bool(flag)) => Self::Bool(flag),
            Value::Scalar(Scalar::Number(number)) => Self::Number(number),
            Value::Scalar(Scalar::String(text)) => Self::String(text),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(fields) => Self::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Scalar(Scalar::String(value.to_string()))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Scalar(Scalar::String(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Scalar(Scalar::Bool(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Scalar(Scalar::Number(value.into()))
    }
}

impl From<BTreeMap<String, Self>> for Value {
    fn from(fields: BTreeMap<String, Self>) -> Self {
        Self::Object(fields)
    }
}

impl From<Vec<Self>> for Value {
    fn from(items: Vec<Self>) -> Self {
        Self::Array(items)
    }
}
