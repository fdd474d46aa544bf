//! HostValue: untyped host-side value
//!
//! Produced when the bridge decodes a guest value without a declared target
//! shape. Unlike [`GuestValue`](crate::GuestValue), integers and floats are
//! distinct variants, so untyped decoding has to guess which one a guest
//! number meant. See `cmdr_bridge::convert` for the rule used.

use std::collections::BTreeMap;

/// An owned, untyped host value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    /// Absent value
    #[default]
    Null,

    /// Boolean value
    Bool(bool),

    /// Signed integer
    Int(i64),

    /// Floating point
    Float(f64),

    /// UTF-8 string
    String(String),

    /// Byte buffer
    Bytes(Vec<u8>),

    /// Ordered sequence
    Array(Vec<HostValue>),

    /// String-keyed map
    Map(BTreeMap<String, HostValue>),
}

impl HostValue {
    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Null => "null",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::Float(_) => "float",
            HostValue::String(_) => "string",
            HostValue::Bytes(_) => "bytes",
            HostValue::Array(_) => "array",
            HostValue::Map(_) => "map",
        }
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    /// Get as a bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            HostValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as a float. Integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            HostValue::Float(f) => Some(*f),
            HostValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Look up a key on a map value
    pub fn get(&self, key: &str) -> Option<&HostValue> {
        match self {
            HostValue::Map(map) => map.get(key),
            _ => None,
        }
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<i64> for HostValue {
    fn from(i: i64) -> Self {
        HostValue::Int(i)
    }
}

impl From<f64> for HostValue {
    fn from(f: f64) -> Self {
        HostValue::Float(f)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::String(s)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(items: Vec<HostValue>) -> Self {
        HostValue::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert_eq!(HostValue::Int(3).as_int(), Some(3));
        assert_eq!(HostValue::Int(3).as_float(), Some(3.0));
        assert_eq!(HostValue::Float(0.5).as_int(), None);
        assert_eq!(HostValue::from("x").as_str(), Some("x"));
        assert!(HostValue::default().is_null());
    }

    #[test]
    fn test_map_get() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), HostValue::Int(1));
        let value = HostValue::Map(map);
        assert_eq!(value.get("a"), Some(&HostValue::Int(1)));
        assert_eq!(value.get("b"), None);
        assert_eq!(HostValue::Null.get("a"), None);
    }
}
