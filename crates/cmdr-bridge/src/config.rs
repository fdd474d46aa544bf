//! Bridge configuration
//!
//! Loaded from a TOML document or built in code:
//!
//! ```toml
//! max_depth = 32
//! max_allocation_bytes = 1048576
//! max_total_bytes = 67108864
//! safe_integers = true
//! builtin_rules = true
//! ```

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Default maximum nesting depth for encode/decode
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Errors raised while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the file
    #[error("Failed to read bridge config: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse bridge config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Parsed but semantically invalid
    #[error("Invalid bridge config: {0}")]
    Invalid(String),
}

/// Bridge-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Maximum nesting depth for encode/decode
    pub max_depth: usize,

    /// Per-allocation byte cap (None = unlimited)
    pub max_allocation_bytes: Option<usize>,

    /// Cap on live tracked bytes (None = unlimited)
    pub max_total_bytes: Option<usize>,

    /// Reject integers beyond 2^53 - 1 instead of rounding them
    pub safe_integers: bool,

    /// Register the timestamp and command-error rules at construction
    pub builtin_rules: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_allocation_bytes: None,
            max_total_bytes: None,
            safe_integers: true,
            builtin_rules: true,
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 {
            return Err(ConfigError::Invalid("max_depth must be at least 1".to_string()));
        }
        if let (Some(per), Some(total)) = (self.max_allocation_bytes, self.max_total_bytes) {
            if per > total {
                return Err(ConfigError::Invalid(format!(
                    "max_allocation_bytes ({}) exceeds max_total_bytes ({})",
                    per, total
                )));
            }
        }
        Ok(())
    }

    /// Configuration with a specific nesting depth
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            ..Default::default()
        }
    }

    /// Configuration with a cap on live tracked bytes
    pub fn with_memory_limit(max_total_bytes: usize) -> Self {
        Self {
            max_total_bytes: Some(max_total_bytes),
            ..Default::default()
        }
    }

    /// Configuration without the builtin conversion rules
    pub fn without_builtin_rules() -> Self {
        Self {
            builtin_rules: false,
            ..Default::default()
        }
    }
}
