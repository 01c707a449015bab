//! Error types shared by every coreplug crate.

use thiserror::Error;

/// Result type alias for coreplug operations.
pub type HotplugResult<T> = Result<T, HotplugError>;

/// Errors that can occur while configuring or driving the hotplug loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HotplugError {
    #[error("resource allocation failed: {0}")]
    ResourceAllocation(String),

    #[error("invalid input for {key}: {reason}")]
    InvalidInput { key: String, reason: String },

    #[error("unknown tunable: {0}")]
    UnknownTunable(String),

    #[error("tunable is read-only: {0}")]
    ReadOnly(String),

    #[error("power command failed for unit {unit}: {reason}")]
    Power { unit: usize, reason: String },

    #[error("load sample failed for unit {unit}: {reason}")]
    Sample { unit: usize, reason: String },

    #[error("power-state subscription failed: {0}")]
    Subscribe(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl HotplugError {
    /// Shorthand for an input validation failure on `key`.
    pub fn invalid(key: &str, reason: impl Into<String>) -> Self {
        HotplugError::InvalidInput {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error came from control-surface input validation.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            HotplugError::InvalidInput { .. } | HotplugError::UnknownTunable(_)
        )
    }
}
