//! Error types shared by the chainlog crates

use thiserror::Error;

/// Main error type for chainlog core operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Identity error: {0}")]
    Identity(String),

    #[error("Feedback error: {0}")]
    Feedback(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an identity error
    pub fn identity(msg: impl Into<String>) -> Self {
        Error::Identity(msg.into())
    }

    /// Create a feedback error
    pub fn feedback(msg: impl Into<String>) -> Self {
        Error::Feedback(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}
