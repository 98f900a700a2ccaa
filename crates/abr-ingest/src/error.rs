//! Error taxonomy for the ingestion pipeline
//!
//! Severity decides how far an error travels:
//!
//! | Variant | Scope | Handling |
//! |---|---|---|
//! | `Parse` | one file | logged, run moves to the next file |
//! | `Persistence` | one batch | batch rolled back, single-record fallback |
//! | `RecordConstraint` | one record | record dropped and logged with its ABN |
//! | `Acquisition` | one archive | retried, then the archive is skipped |
//! | `Store`, `Io`, `Config` | run | escalated to the caller |

use std::path::PathBuf;
use thiserror::Error;

use crate::db::DbError;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed or unreadable XML
    #[error("Failed to parse {} at byte {position}: {message}", path.display())]
    Parse {
        path: PathBuf,
        position: u64,
        message: String,
    },

    /// The batch transaction failed and was rolled back
    #[error("Batch transaction failed: {0}")]
    Persistence(#[source] sqlx::Error),

    /// A single record was rejected by the store during fallback
    #[error("Record {abn} rejected by store: {reason}")]
    RecordConstraint { abn: String, reason: String },

    /// An archive could not be downloaded within the retry budget
    #[error("Failed to fetch {url} after {attempts} attempt(s): {reason}")]
    Acquisition {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// The store cannot be reached at all
    #[error("Store unavailable: {0}")]
    Store(#[from] DbError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    /// Build a parse error for `path`
    pub fn parse(path: impl Into<PathBuf>, position: u64, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            position,
            message: message.into(),
        }
    }
}
