//! Error types for request handling
//!
//! Only failures that happen before a sandbox exists live here. Anything the
//! sandbox itself produces, including engine faults, is reported through
//! `ExecutionResult` so callers can always tell a broken program from a broken
//! platform.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodeboxError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Could not prepare workspace: {0}")]
    Staging(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodeboxError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn staging(msg: impl Into<String>) -> Self {
        Self::Staging(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<serde_yaml::Error> for CodeboxError {
    fn from(err: serde_yaml::Error) -> Self {
        CodeboxError::Config(format!("Failed to parse YAML config: {}", err))
    }
}

// Engine client failures, kept apart from CodeboxError on purpose: they are
// converted into an InfrastructureError result, never propagated with `?`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Container engine is unreachable: {0}")]
    Unreachable(String),
    #[error("Image '{image}' is unavailable: {message}")]
    ImageUnavailable { image: String, message: String },
    #[error("Bollard (Docker client) error: {0}")]
    BollardError(#[from] bollard::errors::Error),
    #[error("Container engine error: {0}")]
    Other(String),
}
