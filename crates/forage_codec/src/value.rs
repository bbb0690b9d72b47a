//! Dynamic value type stored by forage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A binary payload with a MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Blob {
    /// Raw bytes.
    pub data: Vec<u8>,
    /// MIME type, empty when unknown.
    pub mime_type: String,
}

impl Blob {
    /// Creates a blob from bytes and a MIME type.
    pub fn new(data: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Returns the payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A dynamic value.
///
/// This mirrors what a structured-clone capable store can hold: JSON-like
/// values plus raw byte buffers and typed blobs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Numeric value.
    Number(f64),
    /// Text string.
    Text(String),
    /// Raw byte buffer.
    Bytes(Vec<u8>),
    /// Binary payload with a MIME type.
    Blob(Blob),
    /// Array of values.
    Array(Vec<Value>),
    /// String-keyed object.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Returns true for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the text content if this is a [`Value::Text`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number if this is a [`Value::Number`].
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the blob if this is a [`Value::Blob`].
    #[must_use]
    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the object map if this is a [`Value::Object`].
    #[must_use]
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Returns true if this value, or anything nested in it, is a blob.
    #[must_use]
    pub fn contains_blob(&self) -> bool {
        match self {
            Value::Blob(_) => true,
            Value::Array(items) => items.iter().any(Value::contains_blob),
            Value::Object(map) => map.values().any(Value::contains_blob),
            _ => false,
        }
    }

    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Blob(_) => "blob",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Blob> for Value {
    fn from(v: Blob) -> Self {
        Value::Blob(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_none_is_null() {
        let v: Value = Option::<String>::None.into();
        assert!(v.is_null());
        let v: Value = Some("x").into();
        assert_eq!(v.as_str(), Some("x"));
    }

    #[test]
    fn nested_blob_detected() {
        let mut map = BTreeMap::new();
        map.insert(
            "inner".to_string(),
            Value::Array(vec![Value::Blob(Blob::new(vec![1], "a/b"))]),
        );
        assert!(Value::Object(map).contains_blob());
        assert!(!Value::from("plain").contains_blob());
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::from(vec![1u8]).type_name(), "bytes");
        assert_eq!(Value::from(Blob::default()).type_name(), "blob");
    }
}
