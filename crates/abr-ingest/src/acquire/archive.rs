//! Unpacking downloaded archives into the XML working directory

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::source::list_files;

/// Extracts `.zip` archives from a raw directory into an XML directory
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    raw_dir: PathBuf,
    xml_dir: PathBuf,
}

impl ArchiveExtractor {
    pub fn new(raw_dir: impl Into<PathBuf>, xml_dir: impl Into<PathBuf>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            xml_dir: xml_dir.into(),
        }
    }

    /// Extract every `*.zip` in the raw directory, in name order
    ///
    /// Returns the paths written. Entries are flattened to their file name;
    /// an existing file with the same name is overwritten. An archive that
    /// cannot be read is logged and skipped.
    pub fn extract_all(&self) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.xml_dir)
            .with_context(|| format!("Failed to create {}", self.xml_dir.display()))?;

        let archives = list_files(&self.raw_dir, "zip")
            .with_context(|| format!("Failed to list {}", self.raw_dir.display()))?;
        info!(archives = archives.len(), raw_dir = %self.raw_dir.display(), "Extracting archives");

        let mut written = Vec::new();
        for archive in &archives {
            match extract_zip(archive, &self.xml_dir) {
                Ok(files) => {
                    info!(archive = %archive.display(), files = files.len(), "Extracted archive");
                    written.extend(files);
                },
                Err(e) => {
                    error!(archive = %archive.display(), error = %format!("{:#}", e), "Skipping archive");
                },
            }
        }

        Ok(written)
    }
}

/// Extract all file entries of one zip archive into `out_dir`
pub fn extract_zip(archive_path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read zip archive {}", archive_path.display()))?;

    let mut written = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read zip entry {}", i))?;

        if entry.is_dir() {
            continue;
        }

        // Only the file name part is kept; entries that escape the archive root are skipped
        let Some(file_name) = entry
            .enclosed_name()
            .and_then(|p| p.file_name().map(|n| n.to_os_string()))
        else {
            warn!(entry = entry.name(), "Skipping zip entry with unsafe path");
            continue;
        };

        let target = out_dir.join(file_name);
        let mut out = File::create(&target)
            .with_context(|| format!("Failed to create {}", target.display()))?;
        let bytes = io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract {}", target.display()))?;

        debug!(file = %target.display(), bytes, "Extracted entry");
        written.push(target);
    }

    Ok(written)
}
