//! Remote log discovery, validation and download.
//!
//! A fetch cycle retrieves one consistent set of categorized logs for a
//! lookup key (e.g. a service request number) from a remote log directory.
//!
//! # Architecture
//!
//! - **catalog**: one listing of the remote log directory per cycle
//! - **category**: the category sum type and the latest-by-time selector
//! - **scan**: parallel content scan for the content-matched category
//! - **discovery**: fan-out/fan-in across categories
//! - **validate**: skew gate between the content match and a reference log
//! - **download**: concurrent transfers plus rollback
//! - **fetch**: the end-to-end cycle and its report
//!
//! # Example
//!
//! ```rust,ignore
//! use logfetch::config::FetchConfig;
//! use logfetch::logs::discover_and_download;
//!
//! let config = FetchConfig::load(None)?;
//! let files = discover_and_download(&config, "SRN42", Path::new("./SRN42"))?;
//! for name in files {
//!     println!("{name}");
//! }
//! ```
//!
//! Against an arbitrary transport, use a [`Fetcher`] directly:
//!
//! ```rust,ignore
//! use logfetch::logs::Fetcher;
//! use logfetch::remote::MemoryRemote;
//!
//! let remote = MemoryRemote::new("/logs").with_file("ext_1.log", now, "SRN42\n");
//! let report = Fetcher::new(&remote, &config).run("SRN42", dest)?;
//! ```

pub mod catalog;
pub mod category;
pub mod discovery;
pub mod download;
pub mod error;
pub mod fetch;
pub mod scan;
pub mod validate;

pub use catalog::Catalog;
pub use category::{Category, SelectionResult, select_latest};
pub use discovery::{Discovery, ManifestEntry, discover};
pub use download::{
    DownloadBatch, DownloadError, DownloadedLog, Downloader, RollbackError, TransferError,
    TransferFailure, rollback,
};
pub use error::{FetchError, Stage};
pub use fetch::{FetchReport, Fetcher, discover_and_download, fetch};
pub use scan::{contains_marker, scan_for_marker};
pub use validate::{SkewGate, ValidationOutcome, skew_between};
