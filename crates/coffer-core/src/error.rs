//! Configuration error types
//!
//! Errors raised while reading or validating storage configuration records.
//! The storage crate maps `InvalidArgument` onto its own `InvalidArgument` variant.

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
