//! HTTP download of bulk extract archives
//!
//! Each archive is streamed to `<out_dir>/<name>.part` and renamed into place
//! once the body is complete, so a failed attempt never leaves a truncated
//! archive under its final name.

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::error::{IngestError, Result};

/// The two public split archives published on data.gov.au
pub const DEFAULT_ARCHIVE_URLS: &[&str] = &[
    "https://data.gov.au/data/dataset/5bd7fcab-e315-42cb-8daf-50b7efc2027e/resource/0ae4d427-6fa8-4d40-8e76-c6909b5a071b/download/public_split_1_10.zip",
    "https://data.gov.au/data/dataset/5bd7fcab-e315-42cb-8daf-50b7efc2027e/resource/635fcb95-7864-4509-9fa7-a62a6e32b62d/download/public_split_11_20.zip",
];

pub const DEFAULT_DOWNLOAD_ATTEMPTS: u32 = 2;
pub const DEFAULT_DOWNLOAD_BACKOFF_SECS: u64 = 2;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 120;

const USER_AGENT: &str = concat!("abr-ingest/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub urls: Vec<String>,
    /// Total attempts per archive, including the first
    pub attempts: u32,
    /// Fixed pause between attempts
    pub backoff_secs: u64,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            urls: DEFAULT_ARCHIVE_URLS.iter().map(|u| u.to_string()).collect(),
            attempts: DEFAULT_DOWNLOAD_ATTEMPTS,
            backoff_secs: DEFAULT_DOWNLOAD_BACKOFF_SECS,
            timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

impl FetchConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.attempts == 0 {
            return Err("download attempts must be at least 1".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("download timeout must be greater than 0".to_string());
        }
        if let Some(url) = self.urls.iter().find(|u| u.trim().is_empty()) {
            return Err(format!("archive URL cannot be empty: {:?}", url));
        }
        Ok(())
    }
}

/// Downloads archives into a raw directory
pub struct ArchiveFetcher {
    client: Client,
    config: FetchConfig,
}

impl ArchiveFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        config.validate().map_err(IngestError::Config)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| IngestError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Download every configured URL; failures are logged and skipped
    pub async fn fetch_all(&self, out_dir: &Path) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(out_dir).await?;

        let mut saved = Vec::with_capacity(self.config.urls.len());
        for url in &self.config.urls {
            match self.fetch(url, out_dir).await {
                Ok(path) => saved.push(path),
                Err(e @ IngestError::Acquisition { .. }) => {
                    error!(url = %url, error = %e, "Skipping archive");
                },
                Err(e) => return Err(e),
            }
        }

        info!(
            downloaded = saved.len(),
            requested = self.config.urls.len(),
            "Archive download finished"
        );
        Ok(saved)
    }

    /// Download one URL with bounded attempts and a fixed backoff
    pub async fn fetch(&self, url: &str, out_dir: &Path) -> Result<PathBuf> {
        let target = out_dir.join(archive_file_name(url));
        let attempts = self.config.attempts;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            info!(url = %url, attempt, attempts, "Downloading archive");

            match self.download_to(url, &target).await {
                Ok(bytes) => {
                    info!(path = %target.display(), bytes, "Saved archive");
                    return Ok(target);
                },
                Err(e) => {
                    warn!(url = %url, attempt, attempts, error = %e, "Download attempt failed");
                    last_error = e;

                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_secs(self.config.backoff_secs)).await;
                    }
                },
            }
        }

        Err(IngestError::Acquisition {
            url: url.to_string(),
            attempts,
            reason: last_error,
        })
    }

    /// One attempt; returns the number of bytes written
    async fn download_to(&self, url: &str, target: &Path) -> std::result::Result<u64, String> {
        let started = Instant::now();
        let partial = target.with_extension("part");

        let result = self.stream_body(url, &partial).await;
        match result {
            Ok(bytes) => {
                tokio::fs::rename(&partial, target)
                    .await
                    .map_err(|e| format!("failed to move download into place: {}", e))?;
                debug!(
                    bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Download complete"
                );
                Ok(bytes)
            },
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(e)
            },
        }
    }

    async fn stream_body(&self, url: &str, partial: &Path) -> std::result::Result<u64, String> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("HTTP error: {}", response.status()));
        }

        let total = response.content_length();
        let mut file = tokio::fs::File::create(partial)
            .await
            .map_err(|e| format!("cannot create {}: {}", partial.display(), e))?;

        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| format!("body read failed: {}", e))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| format!("write failed: {}", e))?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| format!("flush failed: {}", e))?;

        if let Some(total) = total {
            if total != written {
                return Err(format!("body truncated: {} of {} bytes", written, total));
            }
        }

        Ok(written)
    }
}

/// Last URL path segment, or `download-<millis>.zip` when there is none
pub fn archive_file_name(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("download-{}.zip", chrono::Utc::now().timestamp_millis()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(urls: Vec<String>, attempts: u32) -> FetchConfig {
        FetchConfig {
            urls,
            attempts,
            backoff_secs: 0,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_archive_file_name() {
        assert_eq!(archive_file_name(DEFAULT_ARCHIVE_URLS[0]), "public_split_1_10.zip");
        assert_eq!(archive_file_name("http://host/a/b.zip?x=1"), "b.zip");
        assert!(archive_file_name("http://host/").starts_with("download-"));
        assert!(archive_file_name("not a url").ends_with(".zip"));
    }

    #[test]
    fn test_validate() {
        assert!(FetchConfig::default().validate().is_ok());
        assert!(config(vec![], 0).validate().is_err());
        assert!(config(vec![" ".into()], 1).validate().is_err());
    }

    #[tokio::test]
    async fn test_fetch_streams_body_to_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download/public_split_1_10.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04zipbytes".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let url = format!("{}/download/public_split_1_10.zip", server.uri());
        let fetcher = ArchiveFetcher::new(config(vec![url.clone()], 2)).unwrap();

        let saved = fetcher.fetch(&url, dir.path()).await.unwrap();

        assert_eq!(saved, dir.path().join("public_split_1_10.zip"));
        assert_eq!(std::fs::read(&saved).unwrap(), b"PK\x03\x04zipbytes");
        assert!(!dir.path().join("public_split_1_10.part").exists());
    }

    #[tokio::test]
    async fn test_fetch_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.zip"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/a.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let url = format!("{}/a.zip", server.uri());
        let fetcher = ArchiveFetcher::new(config(vec![], 2)).unwrap();

        let saved = fetcher.fetch(&url, dir.path()).await.unwrap();
        assert_eq!(std::fs::read(saved).unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_fetch_gives_up_after_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.zip"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let url = format!("{}/a.zip", server.uri());
        let fetcher = ArchiveFetcher::new(config(vec![], 3)).unwrap();

        let err = fetcher.fetch(&url, dir.path()).await.unwrap_err();
        match err {
            IngestError::Acquisition { attempts, reason, .. } => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("500"));
            },
            other => panic!("expected acquisition error, got {:?}", other),
        }
        assert!(!dir.path().join("a.zip").exists());
    }

    #[tokio::test]
    async fn test_fetch_all_skips_failed_archives() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.zip"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/present.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let out = dir.path().join("raw");
        let urls = vec![
            format!("{}/missing.zip", server.uri()),
            format!("{}/present.zip", server.uri()),
        ];
        let fetcher = ArchiveFetcher::new(config(urls, 1)).unwrap();

        let saved = fetcher.fetch_all(&out).await.unwrap();
        assert_eq!(saved, vec![out.join("present.zip")]);
    }
}
