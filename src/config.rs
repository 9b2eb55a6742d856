//! Configuration for a log fetch cycle.
//!
//! Values are resolved in three layers:
//!
//! 1. built-in defaults ([`FetchConfig::default`])
//! 2. a TOML file (`--config PATH`, else `<config_dir>/logfetch/logfetch.toml`
//!    when it exists)
//! 3. `LOGFETCH_*` environment variables, with `.env` honoured via `dotenvy`
//!
//! # Example
//!
//! ```toml
//! log_dir = "/var/log/gateway"
//! reference_keyword = "atm"
//! max_skew_minutes = 3
//!
//! [remote]
//! address = "gateway.internal:22"
//! username = "ops"
//! private_key = "/home/ops/.ssh/id_ed25519"
//!
//! [[categories]]
//! policy = "content_match"
//! keyword = "ext"
//!
//! [[categories]]
//! policy = "latest"
//! keyword = "atm"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logs::category::Category;

/// Errors that can occur when loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

/// How to reach and authenticate against the remote machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// `host:port`.
    pub address: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Private key file; takes precedence over password auth.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PathBuf>,
    /// Hex SHA-256 of the server host key. Unset disables pinning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_fingerprint: Option<String>,
    pub connect_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            address: "localhost:2222".to_string(),
            username: "tsabit".to_string(),
            password: None,
            private_key: None,
            host_fingerprint: None,
            connect_timeout_secs: 10,
        }
    }
}

impl RemoteConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Full configuration of a discovery + download cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Remote directory holding every log category.
    pub log_dir: String,
    /// Latest-policy category whose time is compared against the content match.
    pub reference_keyword: String,
    /// Largest tolerated skew between the content match and the reference.
    pub max_skew_secs: u64,
    /// Same limit in minutes; takes precedence over `max_skew_secs` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_skew_minutes: Option<u64>,
    pub remote: RemoteConfig,
    pub categories: Vec<Category>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            log_dir: "/home/tsabit/logs".to_string(),
            reference_keyword: "atm".to_string(),
            max_skew_secs: 120,
            max_skew_minutes: None,
            remote: RemoteConfig::default(),
            categories: vec![
                Category::content_match("ext"),
                Category::latest("atm"),
                Category::latest("base"),
                Category::latest("bootstrap"),
            ],
        }
    }
}

impl FetchConfig {
    /// Resolve configuration from file and environment, then validate it.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit_path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `LOGFETCH_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| dotenvy::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LOGFETCH_ADDRESS") {
            self.remote.address = v;
        }
        if let Some(v) = lookup("LOGFETCH_USER") {
            self.remote.username = v;
        }
        if let Some(v) = lookup("LOGFETCH_PASSWORD") {
            self.remote.password = Some(v);
        }
        if let Some(v) = lookup("LOGFETCH_PRIVATE_KEY") {
            self.remote.private_key = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("LOGFETCH_HOST_FINGERPRINT") {
            self.remote.host_fingerprint = Some(v);
        }
        if let Some(v) = lookup("LOGFETCH_LOG_DIR") {
            self.log_dir = v;
        }
        if let Some(v) = lookup("LOGFETCH_MAX_SKEW_SECS") {
            self.max_skew_secs = parse_env("LOGFETCH_MAX_SKEW_SECS", &v)?;
        }
        if let Some(v) = lookup("LOGFETCH_MAX_SKEW_MINUTES") {
            self.max_skew_minutes = Some(parse_env("LOGFETCH_MAX_SKEW_MINUTES", &v)?);
        }
        if let Some(v) = lookup("LOGFETCH_CONNECT_TIMEOUT_SECS") {
            self.remote.connect_timeout_secs = parse_env("LOGFETCH_CONNECT_TIMEOUT_SECS", &v)?;
        }
        Ok(())
    }

    /// Check connection settings, then the category set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid =
            |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Validation(msg)) };

        if self.remote.address.trim().is_empty() {
            return invalid("remote.address is empty".into());
        }
        if self.remote.username.trim().is_empty() {
            return invalid("remote.username is empty".into());
        }
        if self.remote.password.is_none() && self.remote.private_key.is_none() {
            return invalid(
                "no credentials: set remote.password, remote.private_key or LOGFETCH_PASSWORD"
                    .into(),
            );
        }
        if self.log_dir.trim().is_empty() {
            return invalid("log_dir is empty".into());
        }
        self.validate_categories()
    }

    /// Check the category set and reference keyword.
    ///
    /// Independent of how the remote is reached, so every fetch cycle runs it.
    pub fn validate_categories(&self) -> Result<(), ConfigError> {
        let invalid =
            |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Validation(msg)) };

        let mut seen = HashSet::new();
        for category in &self.categories {
            let keyword = category.keyword();
            if keyword.is_empty() {
                return invalid("category keyword is empty".into());
            }
            if !seen.insert(keyword) {
                return invalid(format!("duplicate category keyword `{keyword}`"));
            }
        }

        let content = self
            .categories
            .iter()
            .filter(|c| c.is_content_match())
            .count();
        if content != 1 {
            return invalid(format!(
                "exactly one content_match category is required, found {content}"
            ));
        }

        match self.category(&self.reference_keyword) {
            Some(c) if !c.is_content_match() => Ok(()),
            Some(_) => invalid(format!(
                "reference_keyword `{}` must name a latest category",
                self.reference_keyword
            )),
            None => invalid(format!(
                "reference_keyword `{}` matches no category",
                self.reference_keyword
            )),
        }
    }

    /// The single content-matched category, if configured.
    pub fn content_category(&self) -> Option<&Category> {
        self.categories.iter().find(|c| c.is_content_match())
    }

    pub fn category(&self, keyword: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.keyword() == keyword)
    }

    pub fn max_skew(&self) -> Duration {
        match self.max_skew_minutes {
            Some(minutes) => Duration::from_secs(minutes.saturating_mul(60)),
            None => Duration::from_secs(self.max_skew_secs),
        }
    }

    /// A copy safe to print: the password is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.remote.password.is_some() {
            copy.remote.password = Some("********".to_string());
        }
        copy
    }
}

/// `<config_dir>/logfetch/logfetch.toml` for the current platform.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "logfetch", "logfetch")
        .map(|dirs| dirs.config_dir().join("logfetch.toml"))
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}
