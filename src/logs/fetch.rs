//! One discovery + download cycle.
//!
//! ```text
//! catalog ─▶ (selector ∥ scanner per category) ─▶ skew gate ─▶ downloader
//!                                                                 │
//!                                                 rollback ◀─ any failure
//! ```
//!
//! Nothing touches the destination directory until discovery and
//! validation have succeeded. Once downloading starts, the cycle is
//! all-or-nothing: any failed transfer removes every file and directory
//! the cycle created.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use super::catalog::Catalog;
use super::discovery::{self, Discovery};
use super::download::{self, DownloadedLog, Downloader};
use super::error::FetchError;
use super::validate::SkewGate;
use crate::config::{ConfigError, FetchConfig};
use crate::remote::{RemoteFs, SftpRemote};

/// Summary of a successful cycle.
#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub lookup_key: String,
    pub destination: PathBuf,
    /// Files now present in `destination`, manifest order.
    pub files: Vec<DownloadedLog>,
    /// Skew measured by the gate, in seconds.
    pub skew_secs: u64,
    pub duration_ms: u64,
}

impl FetchReport {
    pub fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.name.clone()).collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes).sum()
    }
}

/// Runs cycles against one remote with one configuration.
pub struct Fetcher<'a> {
    remote: &'a dyn RemoteFs,
    config: &'a FetchConfig,
}

impl<'a> Fetcher<'a> {
    pub fn new(remote: &'a dyn RemoteFs, config: &'a FetchConfig) -> Self {
        Self { remote, config }
    }

    /// Discovery phase only: list, select, scan. Reads, never writes.
    pub fn discover(&self, lookup_key: &str) -> Result<Discovery, FetchError> {
        if lookup_key.trim().is_empty() {
            return Err(FetchError::InvalidLookupKey);
        }
        let catalog = Catalog::read(self.remote, &self.config.log_dir)?;
        discovery::discover(
            self.remote,
            &catalog,
            &self.config.categories,
            &self.config.reference_keyword,
            lookup_key,
        )
    }

    /// Run a full cycle, leaving `destination` complete or untouched.
    pub fn run(&self, lookup_key: &str, destination: &Path) -> Result<FetchReport, FetchError> {
        let start = Instant::now();
        tracing::info!(
            lookup_key,
            log_dir = %self.config.log_dir,
            destination = %destination.display(),
            "fetch cycle started"
        );

        self.config.validate_categories()?;
        let content_keyword = self
            .config
            .content_category()
            .map(|c| c.keyword())
            .ok_or_else(|| {
                FetchError::Config(ConfigError::Validation(
                    "no content_match category configured".into(),
                ))
            })?;

        let discovery = self.discover(lookup_key)?;
        let outcome = SkewGate::new(self.config.max_skew()).validate(
            &discovery,
            content_keyword,
            &self.config.reference_keyword,
        )?;

        let created_dirs = download::create_destination(destination).map_err(|source| {
            FetchError::Destination {
                path: destination.to_path_buf(),
                source,
            }
        })?;

        let manifest = discovery.manifest();
        let batch = Downloader::new(self.remote, &self.config.log_dir, destination)
            .download_all(&manifest);
        if !batch.is_complete() {
            tracing::warn!(
                failed = batch.failures.len(),
                created = batch.created.len(),
                "download batch incomplete, rolling back"
            );
        }
        let created = batch.created.clone();

        let files = match batch.into_result() {
            Ok(files) => files,
            Err(err) => {
                let cause = FetchError::Download(err);
                let undone = download::rollback(&created)
                    .and_then(|_| download::remove_created_dirs(&created_dirs));
                return Err(match undone {
                    Ok(_) => cause,
                    Err(rb) => FetchError::Rollback {
                        cause: Box::new(cause),
                        path: rb.path,
                        source: rb.source,
                    },
                });
            }
        };

        let report = FetchReport {
            lookup_key: lookup_key.to_string(),
            destination: destination.to_path_buf(),
            skew_secs: outcome.skew.as_secs(),
            duration_ms: start.elapsed().as_millis() as u64,
            files,
        };
        tracing::info!(
            files = report.files.len(),
            bytes = report.total_bytes(),
            duration_ms = report.duration_ms,
            "fetch cycle completed"
        );
        Ok(report)
    }
}

/// Connect with `config` and run one cycle.
pub fn fetch(
    config: &FetchConfig,
    lookup_key: &str,
    destination: &Path,
) -> Result<FetchReport, FetchError> {
    if lookup_key.trim().is_empty() {
        return Err(FetchError::InvalidLookupKey);
    }
    let remote = SftpRemote::connect(&config.remote).map_err(FetchError::Connection)?;
    Fetcher::new(&remote, config).run(lookup_key, destination)
}

/// Connect, discover, validate and download; return the local file names.
///
/// On error `destination` holds none of this cycle's files.
pub fn discover_and_download(
    config: &FetchConfig,
    lookup_key: &str,
    destination: &Path,
) -> Result<Vec<String>, FetchError> {
    fetch(config, lookup_key, destination).map(|report| report.file_names())
}
