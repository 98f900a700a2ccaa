//! Extraction → batching → loading
//!
//! Files are processed one after another on a single task. Records from the
//! extractor accumulate in a [`BatchBuffer`]; when it reaches the threshold
//! the full batch is moved into the [`BatchSink`] and extraction waits for
//! the flush to finish. A malformed file is logged and skipped, records it
//! already flushed stay flushed and its unflushed tail is discarded.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::config::DEFAULT_BATCH_SIZE;
use crate::error::{IngestError, Result};
use crate::extractor::{NameOrder, RecordStream};
use crate::models::EntityRecord;

/// Anything that can take ownership of a full batch and persist it
///
/// The pipeline suspends on `flush` until it returns; that await is the
/// only backpressure point between parsing and loading.
#[async_trait]
pub trait BatchSink: Send {
    /// Persist `batch`. Record-level failures go in the report; an `Err`
    /// means the store is unusable and the run should stop.
    async fn flush(&mut self, batch: Vec<EntityRecord>) -> Result<FlushReport>;
}

/// A record that failed both the batch and its own transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedRecord {
    pub abn: String,
    pub reason: String,
}

/// Outcome of one flush
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub attempted: usize,
    pub persisted: usize,
    pub dropped: Vec<DroppedRecord>,
    pub used_fallback: bool,
}

/// Bounded record buffer that hands over its contents exactly at the threshold
#[derive(Debug)]
pub struct BatchBuffer {
    threshold: usize,
    records: Vec<EntityRecord>,
}

impl BatchBuffer {
    /// A threshold of zero is treated as one
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            records: Vec::with_capacity(threshold),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Add a record; returns the full batch when this record completes it
    pub fn push(&mut self, record: EntityRecord) -> Option<Vec<EntityRecord>> {
        self.records.push(record);
        if self.records.len() >= self.threshold {
            Some(std::mem::replace(
                &mut self.records,
                Vec::with_capacity(self.threshold),
            ))
        } else {
            None
        }
    }

    /// Remaining partial batch, if any
    pub fn drain(&mut self) -> Option<Vec<EntityRecord>> {
        if self.records.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.records))
        }
    }

    /// Throw away buffered records that were never flushed
    pub fn discard(&mut self) -> usize {
        let discarded = self.records.len();
        self.records.clear();
        discarded
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub batch_size: usize,
    pub name_order: NameOrder,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            name_order: NameOrder::default(),
        }
    }
}

/// Counters for one file
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileStats {
    pub path: PathBuf,
    pub records: usize,
    pub batches: usize,
    pub fallback_batches: usize,
    pub persisted: usize,
    pub dropped: Vec<DroppedRecord>,
    /// Extracted but never flushed because the file failed to parse
    pub discarded: usize,
}

impl FileStats {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            ..Default::default()
        }
    }

    fn absorb(&mut self, report: FlushReport) {
        self.batches += 1;
        self.persisted += report.persisted;
        if report.used_fallback {
            self.fallback_batches += 1;
        }
        self.dropped.extend(report.dropped);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

/// Summary of a whole run, suitable for a JSON report
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub files_total: usize,
    pub files_loaded: usize,
    pub records: usize,
    pub persisted: usize,
    pub batches: usize,
    pub fallback_batches: usize,
    pub discarded: usize,
    pub dropped: Vec<DroppedRecord>,
    pub failed_files: Vec<FailedFile>,
    pub elapsed_ms: u64,
}

impl RunStats {
    fn absorb(&mut self, file: FileStats) {
        self.records += file.records;
        self.persisted += file.persisted;
        self.batches += file.batches;
        self.fallback_batches += file.fallback_batches;
        self.discarded += file.discarded;
        self.dropped.extend(file.dropped);
    }

    pub fn files_failed(&self) -> usize {
        self.failed_files.len()
    }
}

/// Stream one file into `sink`
///
/// A parse failure is returned as [`IngestError::Parse`] after any batches
/// already flushed for this file have been committed.
pub async fn ingest_file<S>(path: &Path, sink: &mut S, options: PipelineOptions) -> Result<FileStats>
where
    S: BatchSink + ?Sized,
{
    let mut stats = FileStats::new(path);
    ingest_file_into(path, sink, options, &mut stats).await?;
    Ok(stats)
}

async fn ingest_file_into<S>(
    path: &Path,
    sink: &mut S,
    options: PipelineOptions,
    stats: &mut FileStats,
) -> Result<()>
where
    S: BatchSink + ?Sized,
{
    let started = Instant::now();
    let stream = RecordStream::open_with(path, options.name_order)?;
    let mut buffer = BatchBuffer::new(options.batch_size);

    info!(file = %path.display(), batch_size = buffer.threshold(), "Processing file");

    for record in stream {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                stats.discarded = buffer.discard();
                return Err(e);
            },
        };

        stats.records += 1;
        if let Some(batch) = buffer.push(record) {
            flush(sink, batch, stats).await?;
        }
    }

    if let Some(batch) = buffer.drain() {
        flush(sink, batch, stats).await?;
    }

    info!(
        file = %path.display(),
        records = stats.records,
        persisted = stats.persisted,
        dropped = stats.dropped.len(),
        batches = stats.batches,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Finished file"
    );

    Ok(())
}

async fn flush<S>(sink: &mut S, batch: Vec<EntityRecord>, stats: &mut FileStats) -> Result<()>
where
    S: BatchSink + ?Sized,
{
    let size = batch.len();
    let report = sink.flush(batch).await?;

    info!(
        file = %stats.path.display(),
        batch = stats.batches + 1,
        size,
        persisted = report.persisted,
        dropped = report.dropped.len(),
        fallback = report.used_fallback,
        "Flushed batch"
    );

    stats.absorb(report);
    Ok(())
}

/// Stream every file in order; parse failures are logged and skipped
///
/// Errors that make the store unusable stop the run and are returned.
pub async fn ingest_files<S>(
    paths: &[PathBuf],
    sink: &mut S,
    options: PipelineOptions,
) -> Result<RunStats>
where
    S: BatchSink + ?Sized,
{
    let started = Instant::now();
    let mut run = RunStats {
        files_total: paths.len(),
        ..Default::default()
    };

    info!(files = paths.len(), batch_size = options.batch_size, "Starting load");

    for path in paths {
        let mut stats = FileStats::new(path);
        match ingest_file_into(path, sink, options, &mut stats).await {
            Ok(()) => run.files_loaded += 1,
            Err(e @ IngestError::Parse { .. }) => {
                error!(
                    file = %path.display(),
                    flushed = stats.persisted,
                    discarded = stats.discarded,
                    error = %e,
                    "Skipping malformed file"
                );
                run.failed_files.push(FailedFile {
                    path: path.clone(),
                    error: e.to_string(),
                });
            },
            Err(e) => {
                run.absorb(stats);
                error!(file = %path.display(), error = %e, "Load aborted");
                return Err(e);
            },
        }
        run.absorb(stats);
    }

    run.elapsed_ms = started.elapsed().as_millis() as u64;

    if run.dropped.is_empty() && run.failed_files.is_empty() {
        info!(
            files = run.files_loaded,
            records = run.records,
            persisted = run.persisted,
            elapsed_ms = run.elapsed_ms,
            "Load complete"
        );
    } else {
        warn!(
            files = run.files_loaded,
            failed_files = run.files_failed(),
            records = run.records,
            persisted = run.persisted,
            dropped = run.dropped.len(),
            elapsed_ms = run.elapsed_ms,
            "Load complete with errors"
        );
    }

    Ok(run)
}
