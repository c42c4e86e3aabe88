//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Endpoint host must be a bare host[:port], without scheme or path")]
    InvalidHost,

    #[error("Reconnect delay must be at least 1ms: {0}")]
    InvalidDelay(&'static str),

    #[error("Reconnect max_delay_ms must not be below base_delay_ms")]
    MaxDelayBelowBase,

    #[error("Reconnect max_attempts must be at least 1")]
    InvalidMaxAttempts,

    #[error("Connect timeout must be between 1 and 120 seconds")]
    InvalidConnectTimeout,

    #[error("Invalid log filter: {0}")]
    InvalidLogFilter(String),
}
