//! Error taxonomy for a fetch cycle.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use super::download::DownloadError;
use crate::config::ConfigError;
use crate::remote::RemoteError;

/// Pipeline stage a [`FetchError`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Connect,
    List,
    Discover,
    Validate,
    Download,
    Rollback,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Setup => "setup",
            Self::Connect => "connect",
            Self::List => "list",
            Self::Discover => "discover",
            Self::Validate => "validate",
            Self::Download => "download",
            Self::Rollback => "rollback",
        };
        f.write_str(label)
    }
}

/// Terminal outcome of a failed fetch cycle.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Lookup key must not be empty")]
    InvalidLookupKey,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to prepare destination {path}: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection failed: {0}")]
    Connection(#[source] RemoteError),

    #[error("Failed to read remote log directory: {0}")]
    RemoteList(#[source] RemoteError),

    #[error("{keyword} logs not found")]
    CategoryNotFound { keyword: String },

    #[error(
        "{keyword} logs not found: no file of {candidates} contains `{lookup_key}` ({failed} unreadable)"
    )]
    ContentNotFound {
        keyword: String,
        lookup_key: String,
        candidates: usize,
        failed: usize,
    },

    #[error(
        "Inconsistent environment: {content_keyword} and {reference_keyword} logs are {skew_secs}s apart (max {max_skew_secs}s)"
    )]
    ConsistencyViolation {
        content_keyword: String,
        reference_keyword: String,
        /// Rounded up to whole seconds.
        skew_secs: u64,
        max_skew_secs: u64,
    },

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("{cause}; rollback also failed to remove {path}: {source}")]
    Rollback {
        cause: Box<FetchError>,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// True when the skew gate rejected the batch rather than something breaking.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, Self::ConsistencyViolation { .. })
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::InvalidLookupKey | Self::Config(_) | Self::Destination { .. } => Stage::Setup,
            Self::Connection(_) => Stage::Connect,
            Self::RemoteList(_) => Stage::List,
            Self::CategoryNotFound { .. } | Self::ContentNotFound { .. } => Stage::Discover,
            Self::ConsistencyViolation { .. } => Stage::Validate,
            Self::Download(_) => Stage::Download,
            Self::Rollback { .. } => Stage::Rollback,
        }
    }

    /// Map a listing failure, keeping transport failures in their own class.
    pub(crate) fn from_list(err: RemoteError) -> Self {
        if err.is_connection() {
            Self::Connection(err)
        } else {
            Self::RemoteList(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_skew_is_policy_rejection() {
        let skew = FetchError::ConsistencyViolation {
            content_keyword: "ext".into(),
            reference_keyword: "atm".into(),
            skew_secs: 300,
            max_skew_secs: 120,
        };
        assert!(skew.is_policy_rejection());
        assert_eq!(skew.stage(), Stage::Validate);
        assert_eq!(
            skew.to_string(),
            "Inconsistent environment: ext and atm logs are 300s apart (max 120s)"
        );

        let missing = FetchError::CategoryNotFound {
            keyword: "atm".into(),
        };
        assert!(!missing.is_policy_rejection());
        assert_eq!(missing.to_string(), "atm logs not found");
        assert_eq!(missing.stage().to_string(), "discover");
    }

    #[test]
    fn test_from_list_classifies_transport_failures() {
        let err = FetchError::from_list(RemoteError::List {
            path: "/logs".into(),
            message: "permission denied".into(),
        });
        assert_eq!(err.stage(), Stage::List);

        let err = FetchError::from_list(RemoteError::Connect {
            address: "gw:22".into(),
            message: "reset".into(),
        });
        assert_eq!(err.stage(), Stage::Connect);
    }

    #[test]
    fn test_rollback_keeps_cause() {
        let err = FetchError::Rollback {
            cause: Box::new(FetchError::InvalidLookupKey),
            path: PathBuf::from("/tmp/out/atm.log"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Lookup key must not be empty"));
        assert!(msg.contains("atm.log"));
    }
}
