//! Remote file access capability consumed by the log discovery engine.
//!
//! The engine never talks to SSH directly. It goes through [`RemoteFs`], a
//! small capability trait covering the three primitives discovery and
//! download need: listing a directory, opening a file for streaming reads,
//! and stat'ing a single path.
//!
//! # Implementations
//!
//! - [`sftp::SftpRemote`]: SSH + SFTP via `ssh2`, used by the CLI
//! - [`memory::MemoryRemote`]: an in-memory directory with fault injection,
//!   used by tests
//!
//! All remote paths are POSIX paths regardless of the local platform; build
//! them with [`join`] rather than `std::path`.

pub mod memory;
pub mod sftp;

use std::io::Read;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

pub use memory::MemoryRemote;
pub use sftp::SftpRemote;

/// Errors raised by a remote transport.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Failed to connect to {address}: {message}")]
    Connect { address: String, message: String },

    #[error("SSH handshake with {address} failed: {message}")]
    Handshake { address: String, message: String },

    #[error("Authentication as {username} failed: {message}")]
    Auth { username: String, message: String },

    #[error("Host key mismatch for {address}: expected {expected}, got {actual}")]
    HostKeyMismatch {
        address: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to list {path}: {message}")]
    List { path: String, message: String },

    #[error("Failed to open {path}: {message}")]
    Open { path: String, message: String },

    #[error("Failed to stat {path}: {message}")]
    Stat { path: String, message: String },
}

impl RemoteError {
    /// True for failures that happened before any file operation was possible.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::Handshake { .. }
                | Self::Auth { .. }
                | Self::HostKeyMismatch { .. }
        )
    }
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteEntry {
    /// Bare file name, no directory component.
    pub name: String,
    pub is_dir: bool,
    pub modified_at: DateTime<Utc>,
    /// Size in bytes when the server reports it.
    pub size: Option<u64>,
}

impl RemoteEntry {
    /// A regular file entry.
    pub fn file(name: impl Into<String>, modified_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            modified_at,
            size: None,
        }
    }

    /// A directory entry.
    pub fn dir(name: impl Into<String>, modified_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            modified_at,
            size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

/// Metadata for a single remote path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    pub modified_at: DateTime<Utc>,
    pub size: Option<u64>,
}

/// File access primitives on a remote machine.
///
/// Implementations must tolerate concurrent calls from several threads.
/// Transports without concurrent session support serialize internally.
pub trait RemoteFs: Send + Sync {
    /// List every entry of `dir`, in server order.
    fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Open `path` for a streaming read.
    ///
    /// The reader is consumed on the calling thread; it need not be `Send`.
    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, RemoteError>;

    /// Fetch metadata for `path`.
    fn stat(&self, path: &str) -> Result<RemoteStat, RemoteError>;
}

/// Join a remote directory and a file name with a single `/`.
pub fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        format!("/{}", name.trim_start_matches('/'))
    } else {
        format!("{}/{}", dir, name.trim_start_matches('/'))
    }
}

/// Convert a unix timestamp reported by a server into UTC.
///
/// Servers that omit the mtime get the epoch, which sorts oldest.
pub(crate) fn mtime_to_utc(secs: Option<u64>) -> DateTime<Utc> {
    secs.and_then(|s| i64::try_from(s).ok())
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .unwrap_or_default()
}
