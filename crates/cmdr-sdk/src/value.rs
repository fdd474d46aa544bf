//! GuestValue: the dynamic value shape the guest runtime understands
//!
//! The guest can only hand primitives, binary views and plain containers
//! across the boundary. Anything richer (host objects, weak references,
//! pooled strings) travels as an opaque string token.
//!
//! Numbers are always IEEE 754 doubles on the guest side. Host integers are
//! widened to `Number` and only narrowed again when a declared target shape
//! asks for an integer.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// A value as seen by the guest runtime.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum GuestValue {
    /// Null / undefined
    #[default]
    Null,

    /// Boolean value
    Bool(bool),

    /// Number (always a double on the guest side)
    Number(f64),

    /// UTF-8 string
    String(String),

    /// Binary-array view over a byte buffer
    Bytes(Vec<u8>),

    /// Ordered sequence
    Array(Vec<GuestValue>),

    /// Dynamic object with string keys
    Object(BTreeMap<String, GuestValue>),
}

impl GuestValue {
    /// Build an object from key/value pairs
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, GuestValue)>,
    {
        GuestValue::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Get the guest-facing type name
    pub fn type_name(&self) -> &'static str {
        match self {
            GuestValue::Null => "null",
            GuestValue::Bool(_) => "boolean",
            GuestValue::Number(_) => "number",
            GuestValue::String(_) => "string",
            GuestValue::Bytes(_) => "bytes",
            GuestValue::Array(_) => "array",
            GuestValue::Object(_) => "object",
        }
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, GuestValue::Null)
    }

    /// Get as a bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            GuestValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            GuestValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            GuestValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get as a byte slice
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            GuestValue::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    /// Get as an array slice
    pub fn as_array(&self) -> Option<&[GuestValue]> {
        match self {
            GuestValue::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Get as an object map
    pub fn as_object(&self) -> Option<&BTreeMap<String, GuestValue>> {
        match self {
            GuestValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key on an object value. Returns `None` for non-objects.
    pub fn get(&self, key: &str) -> Option<&GuestValue> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Convert to a JSON value.
    ///
    /// Byte views become arrays of integers. Non-finite numbers have no JSON
    /// representation and become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            GuestValue::Null => Json::Null,
            GuestValue::Bool(b) => Json::Bool(*b),
            GuestValue::Number(n) => number_to_json(*n),
            GuestValue::String(s) => Json::String(s.clone()),
            GuestValue::Bytes(bytes) => {
                Json::Array(bytes.iter().map(|b| Json::from(*b)).collect())
            }
            GuestValue::Array(items) => Json::Array(items.iter().map(|v| v.to_json()).collect()),
            GuestValue::Object(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Convert from a JSON value. JSON has no binary type, so byte views
    /// never come back out of this path.
    pub fn from_json(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => GuestValue::Null,
            Json::Bool(b) => GuestValue::Bool(b),
            Json::Number(n) => n.as_f64().map_or(GuestValue::Null, GuestValue::Number),
            Json::String(s) => GuestValue::String(s),
            Json::Array(items) => {
                GuestValue::Array(items.into_iter().map(GuestValue::from_json).collect())
            }
            Json::Object(map) => GuestValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, GuestValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    // Integral values print without a trailing ".0" so guests see `1`, not `1.0`.
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}

impl fmt::Display for GuestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestValue::Null => write!(f, "null"),
            GuestValue::Bool(b) => write!(f, "{}", b),
            GuestValue::Number(n) => write!(f, "{}", n),
            GuestValue::String(s) => write!(f, "\"{}\"", s),
            GuestValue::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            GuestValue::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            GuestValue::Object(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Serialize for GuestValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for GuestValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(GuestValue::from_json)
    }
}

impl From<bool> for GuestValue {
    fn from(b: bool) -> Self {
        GuestValue::Bool(b)
    }
}

impl From<f64> for GuestValue {
    fn from(n: f64) -> Self {
        GuestValue::Number(n)
    }
}

impl From<&str> for GuestValue {
    fn from(s: &str) -> Self {
        GuestValue::String(s.to_string())
    }
}

impl From<String> for GuestValue {
    fn from(s: String) -> Self {
        GuestValue::String(s)
    }
}

impl From<Vec<GuestValue>> for GuestValue {
    fn from(items: Vec<GuestValue>) -> Self {
        GuestValue::Array(items)
    }
}
