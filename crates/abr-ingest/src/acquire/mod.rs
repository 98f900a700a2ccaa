//! Getting the bulk extract onto local disk
//!
//! [`ArchiveFetcher`] downloads the published zip archives into the raw
//! directory; [`ArchiveExtractor`] unpacks them into the XML directory the
//! loader reads from.

pub mod archive;
pub mod fetch;

pub use archive::{extract_zip, ArchiveExtractor};
pub use fetch::{archive_file_name, ArchiveFetcher, FetchConfig, DEFAULT_ARCHIVE_URLS};
