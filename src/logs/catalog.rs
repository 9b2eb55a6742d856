//! Snapshot of the remote log directory.
//!
//! The directory is listed once per cycle. Every selector and scanner reads
//! the same immutable snapshot, so concurrent tasks never observe a
//! half-populated listing.

use super::error::FetchError;
use crate::remote::{self, RemoteEntry, RemoteFs};

/// Immutable listing of one remote directory.
#[derive(Debug, Clone)]
pub struct Catalog {
    dir: String,
    entries: Vec<RemoteEntry>,
}

impl Catalog {
    /// List `dir` on `remote`.
    pub fn read(remote: &dyn RemoteFs, dir: &str) -> Result<Self, FetchError> {
        let entries = remote.list(dir).map_err(FetchError::from_list)?;
        tracing::debug!(dir, entries = entries.len(), "catalog read");
        Ok(Self::from_entries(dir, entries))
    }

    pub fn from_entries(dir: impl Into<String>, entries: Vec<RemoteEntry>) -> Self {
        Self {
            dir: dir.into(),
            entries,
        }
    }

    /// All entries in listing order, directories included.
    pub fn entries(&self) -> &[RemoteEntry] {
        &self.entries
    }

    /// Regular files whose name starts with `keyword`, in listing order.
    pub fn candidates<'a, 'k>(
        &'a self,
        keyword: &'k str,
    ) -> impl Iterator<Item = &'a RemoteEntry> + use<'a, 'k> {
        self.entries
            .iter()
            .filter(move |e| !e.is_dir && e.name.starts_with(keyword))
    }

    /// Full remote path of an entry name.
    pub fn path_of(&self, name: &str) -> String {
        remote::join(&self.dir, name)
    }
}
