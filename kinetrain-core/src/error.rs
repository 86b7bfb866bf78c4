//! Error types for the kinetrain core library.
//!
//! Uses `thiserror` for structured variants covering telemetry delivery and
//! configuration validation.

use std::path::PathBuf;

/// Errors from delivering a progress record to the telemetry sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Sink transport failed for '{sink}': {message}")]
    Transport { sink: String, message: String },

    #[error("Sink '{sink}' did not answer within {timeout_ms}ms")]
    Timeout { sink: String, timeout_ms: u64 },

    #[error("Sink '{sink}' throttled the request: {message}")]
    Throttled { sink: String, message: String },

    #[error("Authorization rejected by '{sink}': {message}")]
    Auth { sink: String, message: String },

    #[error("Sink '{sink}' rejected the record ({status}): {message}")]
    Rejected {
        sink: String,
        status: u16,
        message: String,
    },

    #[error("Failed to serialize progress record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Missing credentials: {message}")]
    Credentials { message: String },
}

impl SinkError {
    /// Transient failures worth another attempt. Authorization, credential and
    /// payload problems will not heal by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SinkError::Transport { .. } | SinkError::Timeout { .. } | SinkError::Throttled { .. }
        )
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Failed to load configuration: {message}")]
    Load { message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}
