//! ABR Ingest Library
//!
//! Streams the Australian Business Register bulk extract into PostgreSQL.
//!
//! # Pipeline
//!
//! - **acquire**: download the published zip archives and unpack them
//! - **source**: list the extracted XML files in load order
//! - **extractor**: turn each file into a lazy stream of [`EntityRecord`]s
//! - **pipeline**: batch records and hand full batches to a [`BatchSink`]
//! - **loader**: persist batches transactionally, isolating bad records
//!
//! # Example
//!
//! ```no_run
//! use abr_ingest::{db, ingest_files, source, BatchUpsertLoader, IngestConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load()?;
//!     let pool = db::create_pool(&config.database).await?;
//!     db::run_migrations(&pool).await?;
//!
//!     let files = source::list_xml_files(&config.xml_dir)?;
//!     let mut loader = BatchUpsertLoader::new(pool.clone());
//!     let stats = ingest_files(&files, &mut loader, config.pipeline_options()).await?;
//!     tracing::info!(persisted = stats.persisted, "Done");
//!
//!     pool.close().await;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod acquire;
pub mod config;
pub mod db;
pub mod error;
pub mod extractor;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod source;

pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use extractor::{NameOrder, RecordStream};
pub use loader::BatchUpsertLoader;
pub use models::EntityRecord;
pub use pipeline::{ingest_file, ingest_files, BatchSink, FlushReport, PipelineOptions, RunStats};
