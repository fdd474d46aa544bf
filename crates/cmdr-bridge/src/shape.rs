//! Shape descriptors
//!
//! A `Shape` is the declared type of a parameter or conversion target. The
//! converter uses it instead of guessing from the guest value, so `4.0`
//! declared as `float` stays a float.
//!
//! Text grammar (used by the `convert-value` operation):
//!
//! ```text
//! shape   := base suffix*
//! base    := any | null | bool | int | uint | float | string | bytes
//!          | timestamp | handle | error | map<shape>
//! suffix  := "?"     (optional)
//!          | "[]"    (sequence)
//! ```

use crate::error::ConversionError;
use std::fmt;
use std::str::FromStr;

/// Declared type of a value crossing the boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// Anything; decoded without a type hint
    Any,
    /// Only null
    Null,
    /// Boolean
    Bool,
    /// Signed integer
    Int,
    /// Unsigned integer
    UInt,
    /// Floating point
    Float,
    /// String
    String,
    /// Byte buffer
    Bytes,
    /// Point in time
    Timestamp,
    /// Object handle token
    Handle,
    /// Command error envelope
    Error,
    /// Null or the inner shape
    Optional(Box<Shape>),
    /// Sequence of the inner shape
    Array(Box<Shape>),
    /// String-keyed map of the inner shape
    Map(Box<Shape>),
    /// Named fields, by wire name
    Record {
        /// Record type name
        name: String,
        /// (wire name, shape) per field
        fields: Vec<(String, Shape)>,
    },
}

impl Shape {
    /// Optional of this shape
    pub fn optional(self) -> Shape {
        Shape::Optional(Box::new(self))
    }

    /// Sequence of this shape
    pub fn array(self) -> Shape {
        Shape::Array(Box::new(self))
    }

    /// Map of this shape
    pub fn map(self) -> Shape {
        Shape::Map(Box::new(self))
    }

    /// Whether a parameter of this shape may be left out of a call
    pub fn may_be_omitted(&self) -> bool {
        matches!(self, Shape::Null | Shape::Optional(_))
    }

    /// Parse the text grammar
    pub fn parse(text: &str) -> Result<Shape, ConversionError> {
        let text = text.trim();
        if let Some(inner) = text.strip_suffix('?') {
            return Ok(Shape::parse(inner)?.optional());
        }
        if let Some(inner) = text.strip_suffix("[]") {
            return Ok(Shape::parse(inner)?.array());
        }
        if let Some(inner) = text.strip_prefix("map<").and_then(|t| t.strip_suffix('>')) {
            return Ok(Shape::parse(inner)?.map());
        }
        match text {
            "any" => Ok(Shape::Any),
            "null" => Ok(Shape::Null),
            "bool" | "boolean" => Ok(Shape::Bool),
            "int" | "integer" => Ok(Shape::Int),
            "uint" => Ok(Shape::UInt),
            "float" | "number" => Ok(Shape::Float),
            "string" => Ok(Shape::String),
            "bytes" => Ok(Shape::Bytes),
            "timestamp" => Ok(Shape::Timestamp),
            "handle" => Ok(Shape::Handle),
            "error" => Ok(Shape::Error),
            _ => Err(ConversionError::InvalidShape(text.to_string())),
        }
    }
}

impl FromStr for Shape {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Shape::parse(s)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Any => write!(f, "any"),
            Shape::Null => write!(f, "null"),
            Shape::Bool => write!(f, "bool"),
            Shape::Int => write!(f, "int"),
            Shape::UInt => write!(f, "uint"),
            Shape::Float => write!(f, "float"),
            Shape::String => write!(f, "string"),
            Shape::Bytes => write!(f, "bytes"),
            Shape::Timestamp => write!(f, "timestamp"),
            Shape::Handle => write!(f, "handle"),
            Shape::Error => write!(f, "error"),
            Shape::Optional(inner) => write!(f, "{}?", inner),
            Shape::Array(inner) => write!(f, "{}[]", inner),
            Shape::Map(inner) => write!(f, "map<{}>", inner),
            Shape::Record { name, .. } => write!(f, "{}", name),
        }
    }
}
