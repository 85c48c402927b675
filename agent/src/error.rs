//! Error types for the CodePulse agent.
//!
//! This module defines the umbrella error type used at the crate's top
//! level, aggregating the per-module error enums into one conversion
//! surface for `?`.

use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::host::HostError;

/// Errors that can occur during agent operations.
///
/// This is the primary error type for the agent crate, encompassing all
/// possible failure modes.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Host facility error (secret or durable state storage).
    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// Offline cache error.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_conversion() {
        let config_err = ConfigError::InvalidValue {
            key: "CODEPULSE_SYNC_INTERVAL_MINUTES".to_string(),
            message: "expected positive integer".to_string(),
        };
        let err: AgentError = config_err.into();
        assert!(matches!(err, AgentError::Config(_)));
        assert_eq!(
            err.to_string(),
            "configuration error: invalid value for CODEPULSE_SYNC_INTERVAL_MINUTES: expected positive integer"
        );
    }

    #[test]
    fn io_error_conversion_preserves_source() {
        use std::error::Error;

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AgentError = io_err.into();
        assert!(matches!(err, AgentError::Io(_)));
        assert!(err.source().is_some());
    }

    #[test]
    fn json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ nope }").unwrap_err();
        let err: AgentError = json_err.into();
        assert!(matches!(err, AgentError::Json(_)));
        assert!(err.to_string().contains("JSON error"));
    }

    #[test]
    fn host_error_conversion() {
        let host_err = HostError::InvalidKey("../escape".to_string());
        let err: AgentError = host_err.into();
        assert!(matches!(err, AgentError::Host(_)));
    }
}
