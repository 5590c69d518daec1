//! Error types for the pillbox_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pillbox_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or malformed user input; nothing was committed
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Document does not exist or is not visible to the caller
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record store failure (lock, corrupt file, write-back mismatch)
    #[error("Store error: {0}")]
    Store(String),

    /// No caller identity available
    #[error("Identity error: {0}")]
    Identity(String),
}

impl Error {
    /// True for failures caused by the caller's input rather than the store
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::NotFound(_) | Error::Identity(_)
        )
    }
}
