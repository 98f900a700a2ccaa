//! Input file discovery

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;

/// Regular files directly under `dir` with the given extension (case-insensitive),
/// sorted by path
pub fn list_files(dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let matches = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches && entry.file_type()?.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// The XML files to load, in lexicographic order
///
/// Subdirectories are not descended into. An unreadable directory is a
/// run-level error.
pub fn list_xml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let files = list_files(dir, "xml")?;
    info!(dir = %dir.display(), files = files.len(), "Found XML files");
    Ok(files)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use tempfile::TempDir;

    #[test]
    fn test_sorted_top_level_only() {
        let dir = TempDir::new().unwrap();
        for name in ["20260101_Public02.xml", "20260101_Public01.xml", "c.XML", "d.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("sub.xml")).unwrap();
        fs::write(dir.path().join("sub.xml").join("inner.xml"), "").unwrap();

        let names: Vec<_> = list_xml_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["20260101_Public01.xml", "20260101_Public02.xml", "c.XML"]);
    }

    #[test]
    fn test_missing_directory_is_fatal() {
        let result = list_xml_files(Path::new("/nonexistent/abr/xml"));
        assert!(matches!(result, Err(IngestError::Io(_))));
    }
}
