//! Common test utilities for ABR ingest integration tests using testcontainers
//!
//! Each test gets its own throwaway PostgreSQL container with the schema
//! migrations applied.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::TestPostgres;
//!
//! #[tokio::test]
//! #[ignore = "requires Docker"]
//! async fn test_with_postgres() {
//!     let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
//!     sqlx::query("SELECT 1").execute(pg.pool()).await.expect("Query failed");
//! }
//! ```

#![allow(dead_code)]

use abr_ingest::db;
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::PathBuf;
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::{debug, info};

/// PostgreSQL test container wrapper
///
/// The container is stopped when this value is dropped.
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    /// Start a new PostgreSQL container with migrations applied
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);
        debug!("PostgreSQL connection: {}", connection_string);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        db::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }
}

/// Initialize test logging
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,abr_ingest=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}

/// Path to a file under `tests/fixtures`
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Row in `abn_entities`, for assertions
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct EntityRow {
    pub abn: String,
    pub status: Option<String>,
    pub status_from: Option<String>,
    pub entity_type: Option<String>,
    pub legal_name: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub acn: Option<String>,
    pub gst_registered: Option<bool>,
}

pub async fn fetch_entity(pool: &PgPool, abn: &str) -> Option<EntityRow> {
    sqlx::query_as::<_, EntityRow>(
        "SELECT abn, status, status_from, entity_type, legal_name, state, postcode, acn, \
         gst_registered FROM abn_entities WHERE abn = $1",
    )
    .bind(abn)
    .fetch_optional(pool)
    .await
    .expect("query abn_entities")
}

pub async fn fetch_names(pool: &PgPool, abn: &str) -> Vec<String> {
    sqlx::query_scalar::<_, String>("SELECT name FROM business_names WHERE abn = $1 ORDER BY name")
        .bind(abn)
        .fetch_all(pool)
        .await
        .expect("query business_names")
}

pub async fn count_entities(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM abn_entities")
        .fetch_one(pool)
        .await
        .expect("count abn_entities")
}
