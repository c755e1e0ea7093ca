//! Error types for OllamaServe

use thiserror::Error;

/// Result type alias using OllamaServe's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for OllamaServe operations
#[derive(Error, Debug)]
pub enum Error {
    /// The supervised process failed to spawn or exited immediately
    #[error("Failed to start Ollama service: {0}")]
    Start(String),

    /// Signal delivery or exit wait failed during shutdown
    #[error("Failed to stop Ollama service: {0}")]
    Stop(String),

    /// Network-level unreachability, distinct from an unhealthy response
    #[error("Connection error: {0}")]
    Connection(String),

    /// The health probe exhausted its retries or hit an unexpected failure
    #[error("Health check failed: {0}")]
    HealthCheck(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage backend error
    #[error("Database error: {0}")]
    Database(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a start error
    pub fn start(msg: impl Into<String>) -> Self {
        Self::Start(msg.into())
    }

    /// Create a stop error
    pub fn stop(msg: impl Into<String>) -> Self {
        Self::Stop(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a health-check error
    pub fn health_check(msg: impl Into<String>) -> Self {
        Self::HealthCheck(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
