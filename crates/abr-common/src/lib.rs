//! ABR Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging setup for the ABR ingest workspace.
//!
//! # Example
//!
//! ```no_run
//! use abr_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> abr_common::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     let _guard = init_logging(&config)?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{AbrError, Result};
