//! Error types for the update broker
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for broker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the update broker
#[derive(Error, Debug)]
pub enum Error {
    /// Store-related errors (store unavailable, IO failure)
    #[error("Store error: {0}")]
    Store(String),

    /// Unique or protected-reference constraint violated
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// Entity failed field validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Secret hashing errors
    #[error("Secret hashing failed: {0}")]
    Hash(String),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Outbound provider error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider or target name
        provider: String,
        /// Error message
        message: String,
    },
}

impl Error {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a constraint error
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a hashing error
    pub fn hash(msg: impl Into<String>) -> Self {
        Self::Hash(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}
