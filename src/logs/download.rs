//! Concurrent downloader and rollback.
//!
//! Every manifest entry is streamed to `destination/<name>` on its own rayon
//! task. Transfers never cancel each other: the batch reports every
//! completed file, every failure, and every local path it created so the
//! caller can roll the destination back.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use super::discovery::ManifestEntry;
use crate::remote::{self, RemoteError, RemoteFs};

/// A file that landed in the destination directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadedLog {
    pub name: String,
    /// Keyword of the category that selected the file.
    pub category: String,
    pub local_path: PathBuf,
    pub bytes: u64,
}

/// Why a single transfer failed.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("refusing unsafe file name")]
    UnsafeName,

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("cannot create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("copy into {path} failed: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("truncated: copied {copied} of {expected} bytes")]
    Truncated { expected: u64, copied: u64 },
}

/// One failed manifest entry.
#[derive(Debug)]
pub struct TransferFailure {
    pub name: String,
    pub error: TransferError,
}

impl fmt::Display for TransferFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.error)
    }
}

/// Aggregate failure of a download batch.
#[derive(Error, Debug)]
#[error(
    "{} of {} downloads failed; first: {}",
    .failures.len(),
    .attempted,
    first_failure(.failures)
)]
pub struct DownloadError {
    pub attempted: usize,
    pub failures: Vec<TransferFailure>,
}

fn first_failure(failures: &[TransferFailure]) -> String {
    failures
        .first()
        .map(ToString::to_string)
        .unwrap_or_default()
}

/// Everything a batch did, successful or not.
#[derive(Debug, Default)]
pub struct DownloadBatch {
    pub completed: Vec<DownloadedLog>,
    pub failures: Vec<TransferFailure>,
    /// Local files created by this batch, including partial ones.
    pub created: Vec<PathBuf>,
}

impl DownloadBatch {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Split into the completed files or the aggregate error.
    pub fn into_result(self) -> Result<Vec<DownloadedLog>, DownloadError> {
        if self.failures.is_empty() {
            Ok(self.completed)
        } else {
            Err(DownloadError {
                attempted: self.completed.len() + self.failures.len(),
                failures: self.failures,
            })
        }
    }
}

struct TransferOutcome {
    created: Option<PathBuf>,
    result: Result<DownloadedLog, TransferFailure>,
}

/// Streams remote files from one directory into one local directory.
pub struct Downloader<'a> {
    remote: &'a dyn RemoteFs,
    remote_dir: &'a str,
    destination: &'a Path,
}

impl<'a> Downloader<'a> {
    pub fn new(remote: &'a dyn RemoteFs, remote_dir: &'a str, destination: &'a Path) -> Self {
        Self {
            remote,
            remote_dir,
            destination,
        }
    }

    /// Download every entry concurrently and wait for all of them.
    pub fn download_all(&self, manifest: &[ManifestEntry]) -> DownloadBatch {
        let outcomes: Vec<TransferOutcome> =
            manifest.par_iter().map(|entry| self.transfer(entry)).collect();

        let mut batch = DownloadBatch::default();
        for outcome in outcomes {
            if let Some(path) = outcome.created {
                batch.created.push(path);
            }
            match outcome.result {
                Ok(log) => batch.completed.push(log),
                Err(failure) => {
                    tracing::warn!(file = %failure.name, error = %failure.error, "download failed");
                    batch.failures.push(failure);
                }
            }
        }
        batch
    }

    fn transfer(&self, entry: &ManifestEntry) -> TransferOutcome {
        let fail = |error: TransferError| TransferFailure {
            name: entry.name.clone(),
            error,
        };

        if !is_safe_name(&entry.name) {
            return TransferOutcome {
                created: None,
                result: Err(fail(TransferError::UnsafeName)),
            };
        }

        let remote_path = remote::join(self.remote_dir, &entry.name);
        let local_path = self.destination.join(&entry.name);

        // Size is taken before the copy; live logs may grow but never shrink.
        let expected = match self.remote.stat(&remote_path) {
            Ok(stat) => stat.size,
            Err(e) => {
                return TransferOutcome {
                    created: None,
                    result: Err(fail(e.into())),
                };
            }
        };
        let mut reader = match self.remote.open(&remote_path) {
            Ok(reader) => reader,
            Err(e) => {
                return TransferOutcome {
                    created: None,
                    result: Err(fail(e.into())),
                };
            }
        };

        let file = match create_new(&local_path) {
            Ok(file) => file,
            Err(source) => {
                return TransferOutcome {
                    created: None,
                    result: Err(fail(TransferError::Create {
                        path: local_path,
                        source,
                    })),
                };
            }
        };

        let mut writer = BufWriter::new(file);
        let copied = io::copy(&mut reader, &mut writer).and_then(|n| writer.flush().map(|()| n));
        let result = match copied {
            Err(source) => Err(fail(TransferError::Copy {
                path: local_path.clone(),
                source,
            })),
            Ok(copied) => match expected {
                Some(expected) if copied < expected => {
                    Err(fail(TransferError::Truncated { expected, copied }))
                }
                _ => {
                    tracing::debug!(file = %entry.name, bytes = copied, "download completed");
                    Ok(DownloadedLog {
                        name: entry.name.clone(),
                        category: entry.keyword.clone(),
                        local_path: local_path.clone(),
                        bytes: copied,
                    })
                }
            },
        };

        TransferOutcome {
            created: Some(local_path),
            result,
        }
    }
}

/// Create `path`, failing if anything already exists there.
fn create_new(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

/// A bare file name that cannot escape the destination directory.
fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}

/// Failure to remove one artifact during rollback.
#[derive(Error, Debug)]
#[error("failed to remove {path}: {source}")]
pub struct RollbackError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Remove every path in `created`.
///
/// Paths that are already gone are skipped, so repeating a rollback is a
/// no-op. Every path is attempted; the first failure is returned.
pub fn rollback(created: &[PathBuf]) -> Result<usize, RollbackError> {
    let mut removed = 0;
    let mut first_error = None;
    for path in created {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                tracing::warn!(path = %path.display(), error = %source, "rollback removal failed");
                if first_error.is_none() {
                    first_error = Some(RollbackError {
                        path: path.clone(),
                        source,
                    });
                }
            }
        }
    }

    if removed > 0 {
        tracing::warn!(removed, "rolled back downloaded logs");
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(removed),
    }
}

/// Create `destination` and any missing parents.
///
/// Returns the directories that did not exist beforehand, shallowest first.
/// If creation fails part way, whatever was created is removed again.
pub fn create_destination(destination: &Path) -> io::Result<Vec<PathBuf>> {
    let mut missing: Vec<PathBuf> = destination
        .ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && matches!(p.try_exists(), Ok(false)))
        .map(Path::to_path_buf)
        .collect();
    missing.reverse();

    if let Err(e) = std::fs::create_dir_all(destination) {
        let _ = remove_created_dirs(&missing);
        return Err(e);
    }
    if !missing.is_empty() {
        tracing::debug!(
            destination = %destination.display(),
            created = missing.len(),
            "destination directories created"
        );
    }
    Ok(missing)
}

/// Remove directories returned by [`create_destination`], deepest first.
///
/// Directories already gone, or holding files this cycle did not write,
/// are left alone, so repeating the call is a no-op.
pub fn remove_created_dirs(dirs: &[PathBuf]) -> Result<usize, RollbackError> {
    let mut removed = 0;
    for dir in dirs.iter().rev() {
        match std::fs::remove_dir(dir) {
            Ok(()) => removed += 1,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::DirectoryNotEmpty
                ) => {}
            Err(source) => {
                tracing::warn!(path = %dir.display(), error = %source, "rollback removal failed");
                return Err(RollbackError {
                    path: dir.clone(),
                    source,
                });
            }
        }
    }
    Ok(removed)
}
