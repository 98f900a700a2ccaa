//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::acquire::fetch::{
    FetchConfig, DEFAULT_DOWNLOAD_ATTEMPTS, DEFAULT_DOWNLOAD_BACKOFF_SECS,
    DEFAULT_DOWNLOAD_TIMEOUT_SECS,
};
use crate::db::DbConfig;
use crate::error::{IngestError, Result};
use crate::extractor::NameOrder;
use crate::pipeline::PipelineOptions;

// ============================================================================
// Ingestion Configuration Constants
// ============================================================================

/// Default number of records per transaction.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default directory for downloaded archives.
pub const DEFAULT_RAW_DIR: &str = "./data/raw";

/// Default directory for extracted XML files.
pub const DEFAULT_XML_DIR: &str = "./data/xml";

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub database: DbConfig,
    pub batch_size: usize,
    pub raw_dir: PathBuf,
    pub xml_dir: PathBuf,
    pub fetch: FetchConfig,
    pub name_order: NameOrder,
    pub run_migrations: bool,
}

impl IngestConfig {
    /// Load `.env` (if present), then read the environment
    pub fn load() -> Result<Self> {
        let config = Self::load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but validation is left to the caller
    ///
    /// Used when command-line overrides are applied before validating.
    pub fn load_unvalidated() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Read settings from the environment, falling back to defaults
    ///
    /// Numeric values that fail to parse fall back to their default; an
    /// unknown `ABR_NAME_ORDER` or `ABR_RUN_MIGRATIONS` value is an error.
    pub fn from_env() -> Result<Self> {
        let defaults = FetchConfig::default();

        let urls = match std::env::var("ABR_DOWNLOAD_URLS") {
            Ok(list) => list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => defaults.urls,
        };

        let name_order = match std::env::var("ABR_NAME_ORDER") {
            Ok(value) => value.parse().map_err(IngestError::Config)?,
            Err(_) => NameOrder::default(),
        };

        let run_migrations = match std::env::var("ABR_RUN_MIGRATIONS") {
            Ok(value) => parse_bool(&value).ok_or_else(|| {
                IngestError::Config(format!("ABR_RUN_MIGRATIONS must be true or false, got {}", value))
            })?,
            Err(_) => true,
        };

        Ok(Self {
            database: DbConfig::from_env(),
            batch_size: std::env::var("ABR_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BATCH_SIZE),
            raw_dir: std::env::var("ABR_RAW_DIR")
                .unwrap_or_else(|_| DEFAULT_RAW_DIR.to_string())
                .into(),
            xml_dir: std::env::var("ABR_XML_DIR")
                .unwrap_or_else(|_| DEFAULT_XML_DIR.to_string())
                .into(),
            fetch: FetchConfig {
                urls,
                attempts: std::env::var("ABR_DOWNLOAD_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DOWNLOAD_ATTEMPTS),
                backoff_secs: std::env::var("ABR_DOWNLOAD_BACKOFF_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DOWNLOAD_BACKOFF_SECS),
                timeout_secs: std::env::var("ABR_DOWNLOAD_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            },
            name_order,
            run_migrations,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(IngestError::Config("batch size must be greater than 0".to_string()));
        }

        self.fetch.validate().map_err(IngestError::Config)?;
        self.database
            .validate()
            .map_err(|e| IngestError::Config(e.to_string()))?;

        Ok(())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            batch_size: self.batch_size,
            name_order: self.name_order,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database: DbConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            raw_dir: PathBuf::from(DEFAULT_RAW_DIR),
            xml_dir: PathBuf::from(DEFAULT_XML_DIR),
            fetch: FetchConfig::default(),
            name_order: NameOrder::default(),
            run_migrations: true,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
