//! ABR Ingest - bulk extract download and load tool

use abr_common::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use abr_ingest::acquire::{ArchiveExtractor, ArchiveFetcher};
use abr_ingest::{db, ingest_files, source, BatchUpsertLoader, IngestConfig, NameOrder, RunStats};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "abr-ingest")]
#[command(author, version, about = "Load the ABR bulk extract into PostgreSQL")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the bulk extract archives
    Download(DownloadArgs),

    /// Unpack downloaded archives into the XML directory
    Extract(ExtractArgs),

    /// Load extracted XML files into the database
    Load(LoadArgs),

    /// Download, extract and load in one go
    Run {
        #[command(flatten)]
        download: DownloadArgs,

        #[command(flatten)]
        extract: ExtractArgs,

        #[command(flatten)]
        load: LoadArgs,

        /// Skip the download step and use archives already in the raw directory
        #[arg(long)]
        skip_download: bool,
    },
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// Archive URLs (defaults to the published split archives)
    #[arg(long = "url", value_name = "URL")]
    urls: Vec<String>,

    /// Attempts per archive
    #[arg(long)]
    attempts: Option<u32>,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Directory holding downloaded archives
    #[arg(long)]
    raw_dir: Option<PathBuf>,

    /// Directory receiving extracted XML files
    #[arg(long)]
    xml_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct LoadArgs {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Records per transaction
    #[arg(long)]
    batch_size: Option<usize>,

    /// How individual names are assembled: document or given-family
    #[arg(long)]
    name_order: Option<NameOrder>,

    /// Do not apply schema migrations before loading
    #[arg(long)]
    skip_migrations: bool,

    /// Write a JSON summary of the run to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

impl DownloadArgs {
    fn apply(&self, config: &mut IngestConfig) {
        if !self.urls.is_empty() {
            config.fetch.urls = self.urls.clone();
        }
        if let Some(attempts) = self.attempts {
            config.fetch.attempts = attempts;
        }
    }
}

impl ExtractArgs {
    fn apply(&self, config: &mut IngestConfig) {
        if let Some(dir) = &self.raw_dir {
            config.raw_dir = dir.clone();
        }
        if let Some(dir) = &self.xml_dir {
            config.xml_dir = dir.clone();
        }
    }
}

impl LoadArgs {
    fn apply(&self, config: &mut IngestConfig) {
        if let Some(url) = &self.database_url {
            config.database.url = url.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(order) = self.name_order {
            config.name_order = order;
        }
        if self.skip_migrations {
            config.run_migrations = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };

    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .format(log_format)
        .log_file_prefix("abr-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    // Flags are applied before validation
    let mut config = IngestConfig::load_unvalidated().context("Failed to load configuration")?;

    match cli.command {
        Command::Download(args) => {
            args.apply(&mut config);
            config.validate()?;
            download(&config).await?;
        },
        Command::Extract(args) => {
            args.apply(&mut config);
            extract(&config).await?;
        },
        Command::Load(args) => {
            args.apply(&mut config);
            config.validate()?;
            let stats = load(&config).await?;
            write_report(args.report.as_deref(), &stats)?;
        },
        Command::Run {
            download: download_args,
            extract: extract_args,
            load: load_args,
            skip_download,
        } => {
            download_args.apply(&mut config);
            extract_args.apply(&mut config);
            load_args.apply(&mut config);
            config.validate()?;

            if skip_download {
                info!("Skipping download");
            } else {
                download(&config).await?;
            }
            extract(&config).await?;
            let stats = load(&config).await?;
            write_report(load_args.report.as_deref(), &stats)?;
        },
    }

    info!("Ingestion complete");
    Ok(())
}

async fn download(config: &IngestConfig) -> Result<()> {
    let fetcher = ArchiveFetcher::new(config.fetch.clone())?;
    let saved = fetcher.fetch_all(&config.raw_dir).await?;

    let requested = fetcher.config().urls.len();
    if saved.len() < requested {
        warn!(
            downloaded = saved.len(),
            requested,
            "Some archives could not be downloaded"
        );
    }
    Ok(())
}

async fn extract(config: &IngestConfig) -> Result<()> {
    let extractor = ArchiveExtractor::new(&config.raw_dir, &config.xml_dir);
    let written = tokio::task::spawn_blocking(move || extractor.extract_all())
        .await
        .context("Extraction task panicked")??;

    info!(files = written.len(), xml_dir = %config.xml_dir.display(), "Extraction complete");
    Ok(())
}

async fn load(config: &IngestConfig) -> Result<RunStats> {
    let files = source::list_xml_files(&config.xml_dir)
        .with_context(|| format!("Failed to list {}", config.xml_dir.display()))?;

    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to connect to database")?;

    let result = async {
        db::health_check(&pool).await?;
        if config.run_migrations {
            db::run_migrations(&pool).await?;
        }
        let mut loader = BatchUpsertLoader::new(pool.clone());
        let stats = ingest_files(&files, &mut loader, config.pipeline_options()).await?;
        anyhow::Ok(stats)
    }
    .await;

    pool.close().await;
    result
}

fn write_report(path: Option<&Path>, stats: &RunStats) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };

    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create report {}", path.display()))?;
    serde_json::to_writer_pretty(file, stats).context("Failed to write report")?;

    info!(report = %path.display(), "Wrote run report");
    Ok(())
}
