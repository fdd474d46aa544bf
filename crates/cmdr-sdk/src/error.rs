//! Command error taxonomy
//!
//! The closed set of errors command logic can hand back to the guest. Each
//! kind carries its own fields; the bridge's error codec turns them into an
//! envelope the guest can inspect without losing the kind.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default code for positional-argument validation failures
pub const CODE_INVALID_ARGUMENT: &str = "commander.invalidArgument";
/// Default code for flag-value validation failures
pub const CODE_INVALID_OPTION_ARGUMENT: &str = "commander.invalidOptionArgument";
/// Default code for structural validation failures
pub const CODE_VALIDATION: &str = "commander.validation";
/// Default code for low-level parse failures
pub const CODE_PARSE: &str = "commander.parse";
/// Default code for command-level failures
pub const CODE_ERROR: &str = "commander.error";

/// Kind discriminant of a [`CommandError`].
///
/// Deserializing an unknown kind name yields [`ErrorKind::Generic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Command-level failure
    Commander,
    /// Positional-argument validation failure
    InvalidArgument,
    /// Flag-value validation failure
    InvalidOptionArgument,
    /// Structural validation failure
    Validation,
    /// Low-level parse failure
    Parse,
    /// Fallback, message only
    #[serde(other)]
    Generic,
}

impl ErrorKind {
    /// All kinds, in declaration order
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::Commander,
        ErrorKind::InvalidArgument,
        ErrorKind::InvalidOptionArgument,
        ErrorKind::Validation,
        ErrorKind::Parse,
        ErrorKind::Generic,
    ];

    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Commander => "Commander",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::InvalidOptionArgument => "InvalidOptionArgument",
            ErrorKind::Validation => "Validation",
            ErrorKind::Parse => "Parse",
            ErrorKind::Generic => "Generic",
        }
    }

    /// Resolve a wire name. Unknown names map to `Generic`.
    pub fn from_name(name: &str) -> Self {
        ErrorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .unwrap_or(ErrorKind::Generic)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by command logic.
///
/// Every kind except `Generic` carries a machine-readable `code` and a
/// process `exit_code`; the constructors fill in the defaults.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Command-level failure
    #[error("{message}")]
    Commander {
        /// Human-readable message
        message: String,
        /// Machine-readable code
        code: String,
        /// Suggested process exit code
        exit_code: i32,
        /// Name of the command that failed, if known
        command: Option<String>,
    },

    /// A positional argument failed validation
    #[error("{message}")]
    InvalidArgument {
        /// Human-readable message
        message: String,
        /// Machine-readable code
        code: String,
        /// Suggested process exit code
        exit_code: i32,
        /// Argument name
        argument: String,
        /// Offending value
        value: String,
    },

    /// A flag value failed validation
    #[error("{message}")]
    InvalidOptionArgument {
        /// Human-readable message
        message: String,
        /// Machine-readable code
        code: String,
        /// Suggested process exit code
        exit_code: i32,
        /// Flag as written, e.g. `--port`
        option: String,
        /// Offending value
        value: String,
    },

    /// Structural validation failure
    #[error("{message}")]
    Validation {
        /// Human-readable message
        message: String,
        /// Machine-readable code
        code: String,
        /// Suggested process exit code
        exit_code: i32,
        /// Field that failed
        field: String,
    },

    /// Low-level parse failure
    #[error("{message}")]
    Parse {
        /// Human-readable message
        message: String,
        /// Machine-readable code
        code: String,
        /// Suggested process exit code
        exit_code: i32,
        /// Argument being parsed, if any
        argument: String,
        /// Option being parsed, if any
        option: String,
        /// Raw value, if any
        value: String,
        /// Position in the argument vector
        position: usize,
    },

    /// Anything else
    #[error("{message}")]
    Generic {
        /// Human-readable message
        message: String,
    },
}

impl CommandError {
    /// Create a command-level error
    pub fn commander(message: impl Into<String>, code: impl Into<String>, exit_code: i32) -> Self {
        CommandError::Commander {
            message: message.into(),
            code: code.into(),
            exit_code,
            command: None,
        }
    }

    /// Create an invalid positional argument error
    pub fn invalid_argument(
        message: impl Into<String>,
        argument: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        CommandError::InvalidArgument {
            message: message.into(),
            code: CODE_INVALID_ARGUMENT.to_string(),
            exit_code: 1,
            argument: argument.into(),
            value: value.into(),
        }
    }

    /// Create an invalid flag value error
    pub fn invalid_option_argument(
        message: impl Into<String>,
        option: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        CommandError::InvalidOptionArgument {
            message: message.into(),
            code: CODE_INVALID_OPTION_ARGUMENT.to_string(),
            exit_code: 1,
            option: option.into(),
            value: value.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        CommandError::Validation {
            message: message.into(),
            code: CODE_VALIDATION.to_string(),
            exit_code: 1,
            field: field.into(),
        }
    }

    /// Create a parse error
    pub fn parse(
        message: impl Into<String>,
        argument: impl Into<String>,
        option: impl Into<String>,
        value: impl Into<String>,
        position: usize,
    ) -> Self {
        CommandError::Parse {
            message: message.into(),
            code: CODE_PARSE.to_string(),
            exit_code: 1,
            argument: argument.into(),
            option: option.into(),
            value: value.into(),
            position,
        }
    }

    /// Create a generic error
    pub fn generic(message: impl Into<String>) -> Self {
        CommandError::Generic {
            message: message.into(),
        }
    }

    /// Attach the failing command name. No-op for kinds other than `Commander`.
    pub fn with_command(mut self, name: impl Into<String>) -> Self {
        if let CommandError::Commander { command, .. } = &mut self {
            *command = Some(name.into());
        }
        self
    }

    /// Kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::Commander { .. } => ErrorKind::Commander,
            CommandError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            CommandError::InvalidOptionArgument { .. } => ErrorKind::InvalidOptionArgument,
            CommandError::Validation { .. } => ErrorKind::Validation,
            CommandError::Parse { .. } => ErrorKind::Parse,
            CommandError::Generic { .. } => ErrorKind::Generic,
        }
    }

    /// Human-readable message
    pub fn message(&self) -> &str {
        match self {
            CommandError::Commander { message, .. }
            | CommandError::InvalidArgument { message, .. }
            | CommandError::InvalidOptionArgument { message, .. }
            | CommandError::Validation { message, .. }
            | CommandError::Parse { message, .. }
            | CommandError::Generic { message } => message,
        }
    }

    /// Machine-readable code. `None` for `Generic`.
    pub fn code(&self) -> Option<&str> {
        match self {
            CommandError::Commander { code, .. }
            | CommandError::InvalidArgument { code, .. }
            | CommandError::InvalidOptionArgument { code, .. }
            | CommandError::Validation { code, .. }
            | CommandError::Parse { code, .. } => Some(code),
            CommandError::Generic { .. } => None,
        }
    }

    /// Suggested exit code. `None` for `Generic`.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandError::Commander { exit_code, .. }
            | CommandError::InvalidArgument { exit_code, .. }
            | CommandError::InvalidOptionArgument { exit_code, .. }
            | CommandError::Validation { exit_code, .. }
            | CommandError::Parse { exit_code, .. } => Some(*exit_code),
            CommandError::Generic { .. } => None,
        }
    }
}

impl From<String> for CommandError {
    fn from(message: String) -> Self {
        CommandError::generic(message)
    }
}

impl From<&str> for CommandError {
    fn from(message: &str) -> Self {
        CommandError::generic(message)
    }
}
