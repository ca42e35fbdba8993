//! Error types for Tollgate.

use std::time::Duration;

use thiserror::Error;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rate limit rule failed validation
    #[error("Invalid rate limit rule: {0}")]
    InvalidRule(String),

    /// A rate limit key failed validation
    #[error("Invalid rate limit key: {0}")]
    InvalidKey(String),

    /// Counter store failures not covered by a more specific variant
    #[error("Store error: {0}")]
    Store(String),

    /// Redis client errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A backend call exceeded its latency bound
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for TollgateError {
    fn from(err: config::ConfigError) -> Self {
        TollgateError::Config(err.to_string())
    }
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
