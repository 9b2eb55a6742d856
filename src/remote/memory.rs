//! In-memory [`RemoteFs`] holding a single log directory.
//!
//! Used by the test suite to drive discovery and download without an SSH
//! server. Faults can be injected per file.

use std::collections::HashSet;
use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};

use super::{RemoteEntry, RemoteError, RemoteFs, RemoteStat, join};

#[derive(Debug, Clone)]
struct MemoryFile {
    entry: RemoteEntry,
    contents: Vec<u8>,
}

/// A remote directory that lives in memory.
#[derive(Debug)]
pub struct MemoryRemote {
    dir: String,
    files: Vec<MemoryFile>,
    fail_list: bool,
    fail_open: HashSet<String>,
    fail_read: HashSet<String>,
    opens: AtomicUsize,
}

impl MemoryRemote {
    /// An empty directory at `dir`.
    pub fn new(dir: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
            fail_list: false,
            fail_open: HashSet::new(),
            fail_read: HashSet::new(),
            opens: AtomicUsize::new(0),
        }
    }

    /// Add a regular file. Listing order follows insertion order.
    pub fn with_file(
        mut self,
        name: impl Into<String>,
        modified_at: DateTime<Utc>,
        contents: impl Into<Vec<u8>>,
    ) -> Self {
        let contents = contents.into();
        let entry = RemoteEntry::file(name, modified_at).with_size(contents.len() as u64);
        self.files.push(MemoryFile { entry, contents });
        self
    }

    /// Add a sub-directory entry.
    pub fn with_dir(mut self, name: impl Into<String>, modified_at: DateTime<Utc>) -> Self {
        self.files.push(MemoryFile {
            entry: RemoteEntry::dir(name, modified_at),
            contents: Vec::new(),
        });
        self
    }

    /// Make `list` fail.
    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// Make `open` fail for `name`.
    pub fn failing_open(mut self, name: impl Into<String>) -> Self {
        self.fail_open.insert(name.into());
        self
    }

    /// Serve the contents of `name`, then fail the next read.
    pub fn failing_read_after_content(mut self, name: impl Into<String>) -> Self {
        self.fail_read.insert(name.into());
        self
    }

    /// Number of successful `open` calls so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn find(&self, path: &str) -> Option<&MemoryFile> {
        self.files
            .iter()
            .find(|f| join(&self.dir, &f.entry.name) == path)
    }
}

impl RemoteFs for MemoryRemote {
    fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        if self.fail_list || dir.trim_end_matches('/') != self.dir.trim_end_matches('/') {
            return Err(RemoteError::List {
                path: dir.to_string(),
                message: "no such directory".to_string(),
            });
        }
        Ok(self.files.iter().map(|f| f.entry.clone()).collect())
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, RemoteError> {
        let open_err = |message: &str| RemoteError::Open {
            path: path.to_string(),
            message: message.to_string(),
        };
        let file = self.find(path).ok_or_else(|| open_err("no such file"))?;
        if file.entry.is_dir {
            return Err(open_err("is a directory"));
        }
        if self.fail_open.contains(&file.entry.name) {
            return Err(open_err("permission denied"));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);

        let reader = Cursor::new(file.contents.as_slice());
        if self.fail_read.contains(&file.entry.name) {
            Ok(Box::new(reader.chain(BrokenTail)))
        } else {
            Ok(Box::new(reader))
        }
    }

    fn stat(&self, path: &str) -> Result<RemoteStat, RemoteError> {
        let file = self.find(path).ok_or_else(|| RemoteError::Stat {
            path: path.to_string(),
            message: "no such file".to_string(),
        })?;
        Ok(RemoteStat {
            modified_at: file.entry.modified_at,
            size: file.entry.size,
        })
    }
}

/// Reader that fails on first use, simulating a connection drop mid-file.
struct BrokenTail;

impl Read for BrokenTail {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::ConnectionAborted,
            "connection dropped mid-read",
        ))
    }
}
