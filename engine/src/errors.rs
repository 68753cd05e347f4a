//! Error types for the deployment engine

use std::time::Duration;

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Deployment cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("Deployment deadline of {deadline:?} exceeded after {attempts} attempt(s)")]
    DeadlineExceeded { deadline: Duration, attempts: u32 },
}

impl EngineError {
    /// Short machine-readable error code used in API responses
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::IoError(_) => "io_error",
            EngineError::JsonError(_) => "json_error",
            EngineError::HttpError(_) => "http_error",
            EngineError::ValidationError(_) => "validation_error",
            EngineError::NotFound(_) => "not_found",
            EngineError::StorageError(_) => "storage_error",
            EngineError::ConfigError(_) => "config_error",
            EngineError::ServerError(_) => "server_error",
            EngineError::ShutdownError(_) => "shutdown_error",
            EngineError::Cancelled { .. } => "cancelled",
            EngineError::DeadlineExceeded { .. } => "deadline_exceeded",
        }
    }
}
