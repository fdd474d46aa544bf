//! Bridge error types
//!
//! Every bridge-internal failure is recovered at the call boundary and
//! reported to the guest as a `{success: false}` envelope. [`BridgeError::code`]
//! supplies the stable machine code used in that envelope.

use crate::token::AllocHandle;
use thiserror::Error;

/// Allocation tracker errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    /// Handle does not name a live allocation
    #[error("Allocation not found: {0}")]
    NotFound(AllocHandle),

    /// Read length exceeds the tracked size
    #[error("Read of {requested} bytes exceeds allocation size {size}")]
    OutOfBounds {
        /// Requested length
        requested: usize,
        /// Tracked size
        size: usize,
    },

    /// Allocator limit reached
    #[error("Allocation of {requested} bytes exceeds limit of {limit} bytes")]
    Exhausted {
        /// Bytes requested
        requested: usize,
        /// Configured limit
        limit: usize,
    },

    /// Payload is not valid UTF-8
    #[error("Allocation {0} does not hold valid UTF-8")]
    InvalidUtf8(AllocHandle),
}

/// Object and weak handle errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    /// Handle does not name a live entry
    #[error("Handle not found: {0}")]
    NotFound(String),

    /// Entry exists but holds a different host type
    #[error("Handle {handle} holds {actual}, expected {expected}")]
    TypeMismatch {
        /// Handle token
        handle: String,
        /// Requested type
        expected: &'static str,
        /// Type tag recorded at creation
        actual: String,
    },

    /// Token is not a handle of the expected kind
    #[error("Invalid handle token: {0:?}")]
    InvalidToken(String),
}

/// Type conversion errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// No structural conversion and no rule for this host type
    #[error("Unsupported host type: {type_name}")]
    Unsupported {
        /// Host type name
        type_name: String,
    },

    /// Guest value shape does not match and cannot be coerced
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Expected shape
        expected: String,
        /// Actual guest type name
        actual: &'static str,
    },

    /// Text could not be parsed as the requested primitive
    #[error("Invalid {expected} literal: {text:?}")]
    InvalidLiteral {
        /// Expected primitive
        expected: &'static str,
        /// Offending text
        text: String,
    },

    /// Negative number for an unsigned target
    #[error("Negative value {value} cannot convert to unsigned {type_name}")]
    NegativeUnsigned {
        /// Offending value
        value: f64,
        /// Target type
        type_name: &'static str,
    },

    /// Number outside the target range
    #[error("Value {value} does not fit in {type_name}")]
    Overflow {
        /// Offending value
        value: f64,
        /// Target type
        type_name: &'static str,
    },

    /// Fractional number for an integer target
    #[error("Expected an integer, got {value}")]
    NotAnInteger {
        /// Offending value
        value: f64,
    },

    /// Sequence element failed
    #[error("Element {index}: {source}")]
    Element {
        /// Element position
        index: usize,
        /// Underlying failure
        source: Box<ConversionError>,
    },

    /// Record field failed
    #[error("Field '{field}': {source}")]
    Field {
        /// Wire name of the field
        field: String,
        /// Underlying failure
        source: Box<ConversionError>,
    },

    /// Map entry failed
    #[error("Entry '{key}': {source}")]
    Entry {
        /// Map key
        key: String,
        /// Underlying failure
        source: Box<ConversionError>,
    },

    /// Value nests deeper than the configured limit
    #[error("Maximum conversion depth {limit} exceeded")]
    MaxDepthExceeded {
        /// Configured limit
        limit: usize,
    },

    /// Shape descriptor could not be parsed
    #[error("Invalid shape: {0:?}")]
    InvalidShape(String),

    /// Referenced handle failed
    #[error(transparent)]
    Handle(#[from] HandleError),
}

impl ConversionError {
    /// Create a shape mismatch error
    pub fn mismatch(expected: impl ToString, actual: &'static str) -> Self {
        ConversionError::ShapeMismatch {
            expected: expected.to_string(),
            actual,
        }
    }

    /// Create an unsupported type error
    pub fn unsupported(type_name: impl Into<String>) -> Self {
        ConversionError::Unsupported {
            type_name: type_name.into(),
        }
    }

    /// Wrap as a sequence element failure
    pub fn at_index(self, index: usize) -> Self {
        ConversionError::Element {
            index,
            source: Box::new(self),
        }
    }

    /// Wrap as a record field failure
    pub fn at_field(self, field: impl Into<String>) -> Self {
        ConversionError::Field {
            field: field.into(),
            source: Box::new(self),
        }
    }

    /// Wrap as a map entry failure
    pub fn at_key(self, key: impl Into<String>) -> Self {
        ConversionError::Entry {
            key: key.into(),
            source: Box::new(self),
        }
    }
}

/// Result type for conversion operations
pub type ConvertResult<T> = Result<T, ConversionError>;

/// Umbrella error for everything the bridge can report
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// Allocation tracker failure
    #[error(transparent)]
    Alloc(#[from] AllocError),

    /// Object or weak handle failure
    #[error(transparent)]
    Handle(#[from] HandleError),

    /// Conversion failure outside argument decoding
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// A required positional argument was not supplied
    #[error("Missing required argument {index} (expected {shape})")]
    MissingArgument {
        /// Argument position
        index: usize,
        /// Declared shape
        shape: String,
    },

    /// A positional argument failed to decode
    #[error("Argument {index}: {source}")]
    Argument {
        /// Argument position
        index: usize,
        /// Underlying failure
        source: ConversionError,
    },

    /// No operation registered under this name
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Call payload could not be parsed
    #[error("Malformed call payload: {0}")]
    MalformedPayload(String),

    /// Command logic or a decoder panicked
    #[error("Panic in {op}: {message}")]
    Panic {
        /// Operation name
        op: String,
        /// Panic payload, if it was a string
        message: String,
    },
}

impl BridgeError {
    /// Stable machine code reported in failure envelopes
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::Alloc(AllocError::NotFound(_)) => "bridge.notFound",
            BridgeError::Alloc(AllocError::OutOfBounds { .. }) => "bridge.outOfBounds",
            BridgeError::Alloc(AllocError::Exhausted { .. }) => "bridge.exhausted",
            BridgeError::Alloc(AllocError::InvalidUtf8(_)) => "bridge.conversion",
            BridgeError::Handle(HandleError::NotFound(_)) => "bridge.notFound",
            BridgeError::Handle(_) => "bridge.invalidHandle",
            BridgeError::Conversion(_) | BridgeError::Argument { .. } => "bridge.conversion",
            BridgeError::MissingArgument { .. } => "bridge.missingArgument",
            BridgeError::UnknownOperation(_) => "bridge.unknownOperation",
            BridgeError::MalformedPayload(_) => "bridge.malformedPayload",
            BridgeError::Panic { .. } => "bridge.panic",
        }
    }

    /// Resource exhaustion is the only failure treated as fatal
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::Alloc(AllocError::Exhausted { .. }))
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
