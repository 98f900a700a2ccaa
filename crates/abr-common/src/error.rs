//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for shared ABR operations
pub type Result<T> = std::result::Result<T, AbrError>;

/// Errors raised by the shared infrastructure (configuration parsing, logging setup)
#[derive(Error, Debug)]
pub enum AbrError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging error: {0}")]
    Logging(String),
}

impl AbrError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
