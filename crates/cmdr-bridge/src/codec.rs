//! Error codec
//!
//! Turns a [`CommandError`] into an [`ErrorEnvelope`] the guest can inspect
//! and back. Each kind writes its own fields under fixed keys (see
//! [`field`]); decoding reads the same keys, so every field written
//! survives the round trip.
//!
//! Decoding never fails on unexpected input: an unknown kind becomes
//! `Generic` with the message only, and a malformed position reads as 0.

use crate::convert::expect_object;
use crate::error::{ConversionError, ConvertResult};
use cmdr_sdk::error::{
    CODE_ERROR, CODE_INVALID_ARGUMENT, CODE_INVALID_OPTION_ARGUMENT, CODE_PARSE, CODE_VALIDATION,
};
use cmdr_sdk::{CommandError, ErrorKind, GuestValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field keys written per kind
pub mod field {
    /// Commander: failing command name, only when known
    pub const COMMAND: &str = "command";
    /// InvalidArgument, Parse: argument name
    pub const ARGUMENT: &str = "argument";
    /// InvalidOptionArgument, Parse: flag as written
    pub const OPTION: &str = "option";
    /// InvalidArgument, InvalidOptionArgument, Parse: offending value
    pub const VALUE: &str = "value";
    /// Validation: field that failed
    pub const FIELD: &str = "field";
    /// Parse: position in the argument vector, decimal
    pub const POSITION: &str = "position";
}

/// Structured form of a command error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// Error kind
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// Machine-readable code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Suggested exit code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Kind-specific fields
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl ErrorEnvelope {
    /// Envelope with no code and no fields
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            exit_code: None,
            fields: BTreeMap::new(),
        }
    }

    fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Read a kind-specific field
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    fn field_or_empty(&self, key: &str) -> String {
        self.field(key).unwrap_or_default().to_string()
    }

    /// Guest object form, with the same keys as the serde form
    pub fn to_guest(&self) -> GuestValue {
        let mut object = BTreeMap::new();
        object.insert("kind".to_string(), GuestValue::from(self.kind.as_str()));
        object.insert("message".to_string(), GuestValue::from(self.message.as_str()));
        if let Some(code) = &self.code {
            object.insert("code".to_string(), GuestValue::from(code.as_str()));
        }
        if let Some(exit_code) = self.exit_code {
            object.insert("exitCode".to_string(), GuestValue::Number(f64::from(exit_code)));
        }
        if !self.fields.is_empty() {
            let fields = self
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), GuestValue::from(v.as_str())))
                .collect();
            object.insert("fields".to_string(), GuestValue::Object(fields));
        }
        GuestValue::Object(object)
    }

    /// Read an envelope from a guest object.
    ///
    /// Missing or mistyped optional members are dropped rather than
    /// rejected; only a non-object value is an error.
    pub fn from_guest(value: &GuestValue) -> ConvertResult<Self> {
        let object = expect_object(value, "error envelope")?;
        let kind = object
            .get("kind")
            .and_then(GuestValue::as_str)
            .map(ErrorKind::from_name)
            .unwrap_or(ErrorKind::Generic);
        let message = match object.get("message") {
            None | Some(GuestValue::Null) => String::new(),
            Some(other) => scalar_text(other).ok_or_else(|| {
                ConversionError::mismatch("string", other.type_name()).at_field("message")
            })?,
        };
        let code = object.get("code").and_then(scalar_text);
        let exit_code = object
            .get("exitCode")
            .and_then(GuestValue::as_f64)
            .filter(|n| n.fract() == 0.0 && *n >= f64::from(i32::MIN) && *n <= f64::from(i32::MAX))
            .map(|n| n as i32);
        let fields = object
            .get("fields")
            .and_then(GuestValue::as_object)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|(k, v)| scalar_text(v).map(|text| (k.clone(), text)))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            kind,
            message,
            code,
            exit_code,
            fields,
        })
    }
}

fn scalar_text(value: &GuestValue) -> Option<String> {
    match value {
        GuestValue::String(text) => Some(text.clone()),
        GuestValue::Number(n) => Some(n.to_string()),
        GuestValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Serialize a command error
pub fn serialize(err: &CommandError) -> ErrorEnvelope {
    let mut envelope = ErrorEnvelope::new(err.kind(), err.message());
    envelope.code = err.code().map(str::to_string);
    envelope.exit_code = err.exit_code();
    match err {
        CommandError::Commander { command, .. } => match command {
            Some(command) => envelope.with_field(field::COMMAND, command.as_str()),
            None => envelope,
        },
        CommandError::InvalidArgument { argument, value, .. } => envelope
            .with_field(field::ARGUMENT, argument.as_str())
            .with_field(field::VALUE, value.as_str()),
        CommandError::InvalidOptionArgument { option, value, .. } => envelope
            .with_field(field::OPTION, option.as_str())
            .with_field(field::VALUE, value.as_str()),
        CommandError::Validation { field: name, .. } => {
            envelope.with_field(field::FIELD, name.as_str())
        }
        CommandError::Parse {
            argument,
            option,
            value,
            position,
            ..
        } => envelope
            .with_field(field::ARGUMENT, argument.as_str())
            .with_field(field::OPTION, option.as_str())
            .with_field(field::VALUE, value.as_str())
            .with_field(field::POSITION, position.to_string()),
        CommandError::Generic { .. } => envelope,
    }
}

/// Reconstruct a command error. Missing code and exit code fall back to the
/// kind's defaults; missing fields read as empty.
pub fn deserialize(envelope: &ErrorEnvelope) -> CommandError {
    let message = envelope.message.clone();
    let code = |default: &str| envelope.code.clone().unwrap_or_else(|| default.to_string());
    let exit_code = envelope.exit_code.unwrap_or(1);
    match envelope.kind {
        ErrorKind::Commander => CommandError::Commander {
            message,
            code: code(CODE_ERROR),
            exit_code,
            command: envelope.field(field::COMMAND).map(str::to_string),
        },
        ErrorKind::InvalidArgument => CommandError::InvalidArgument {
            message,
            code: code(CODE_INVALID_ARGUMENT),
            exit_code,
            argument: envelope.field_or_empty(field::ARGUMENT),
            value: envelope.field_or_empty(field::VALUE),
        },
        ErrorKind::InvalidOptionArgument => CommandError::InvalidOptionArgument {
            message,
            code: code(CODE_INVALID_OPTION_ARGUMENT),
            exit_code,
            option: envelope.field_or_empty(field::OPTION),
            value: envelope.field_or_empty(field::VALUE),
        },
        ErrorKind::Validation => CommandError::Validation {
            message,
            code: code(CODE_VALIDATION),
            exit_code,
            field: envelope.field_or_empty(field::FIELD),
        },
        ErrorKind::Parse => CommandError::Parse {
            message,
            code: code(CODE_PARSE),
            exit_code,
            argument: envelope.field_or_empty(field::ARGUMENT),
            option: envelope.field_or_empty(field::OPTION),
            value: envelope.field_or_empty(field::VALUE),
            position: envelope
                .field(field::POSITION)
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(0),
        },
        ErrorKind::Generic => CommandError::Generic { message },
    }
}

impl From<&CommandError> for ErrorEnvelope {
    fn from(err: &CommandError) -> Self {
        serialize(err)
    }
}

impl From<ErrorEnvelope> for CommandError {
    fn from(envelope: ErrorEnvelope) -> Self {
        deserialize(&envelope)
    }
}
