//! Log categories and the latest-by-time selector.
//!
//! Each [`Category`] carries its own selection policy, so the orchestrator
//! only ever calls [`Category::discover`]:
//!
//! - `Latest`: the single most recently modified file whose name starts
//!   with the keyword
//! - `ContentMatch`: every such file whose body contains the lookup key
//!   (see [`super::scan`])

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::Catalog;
use super::error::FetchError;
use super::scan;
use crate::remote::{RemoteEntry, RemoteFs};

/// A class of log file retrieved by every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum Category {
    /// Files whose body mentions the lookup key; all matches are kept.
    ContentMatch { keyword: String },
    /// The newest file for the keyword.
    Latest { keyword: String },
}

impl Category {
    pub fn content_match(keyword: impl Into<String>) -> Self {
        Self::ContentMatch {
            keyword: keyword.into(),
        }
    }

    pub fn latest(keyword: impl Into<String>) -> Self {
        Self::Latest {
            keyword: keyword.into(),
        }
    }

    pub fn keyword(&self) -> &str {
        match self {
            Self::ContentMatch { keyword } | Self::Latest { keyword } => keyword,
        }
    }

    pub fn is_content_match(&self) -> bool {
        matches!(self, Self::ContentMatch { .. })
    }

    /// Run this category's selection policy against `catalog`.
    pub fn discover(
        &self,
        remote: &dyn RemoteFs,
        catalog: &Catalog,
        lookup_key: &str,
    ) -> Result<SelectionResult, FetchError> {
        match self {
            Self::Latest { keyword } => {
                let entry = select_latest(catalog, keyword)?;
                Ok(SelectionResult {
                    category: self.clone(),
                    names: vec![entry.name.clone()],
                    representative_time: entry.modified_at,
                })
            }
            Self::ContentMatch { keyword } => {
                let matches = scan::scan_for_marker(remote, catalog, keyword, lookup_key)?;
                Ok(SelectionResult::from_content_matches(self.clone(), &matches))
            }
        }
    }
}

/// Files picked for one category plus the time used by the skew gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionResult {
    pub category: Category,
    /// Remote file names in catalog order. Never empty.
    pub names: Vec<String>,
    pub representative_time: DateTime<Utc>,
}

impl SelectionResult {
    /// Build from a non-empty match list; the newest match is representative.
    fn from_content_matches(category: Category, matches: &[&RemoteEntry]) -> Self {
        let representative_time = matches
            .iter()
            .map(|e| e.modified_at)
            .max()
            .unwrap_or_default();
        Self {
            category,
            names: matches.iter().map(|e| e.name.clone()).collect(),
            representative_time,
        }
    }

    pub fn keyword(&self) -> &str {
        self.category.keyword()
    }
}

/// Pick the newest file for `keyword`.
///
/// Ties go to the entry listed first: only a strictly newer mtime replaces
/// the current pick.
pub fn select_latest<'a>(
    catalog: &'a Catalog,
    keyword: &str,
) -> Result<&'a RemoteEntry, FetchError> {
    let mut latest: Option<&RemoteEntry> = None;
    for entry in catalog.candidates(keyword) {
        match latest {
            Some(current) if entry.modified_at <= current.modified_at => {}
            _ => latest = Some(entry),
        }
    }

    let entry = latest.ok_or_else(|| FetchError::CategoryNotFound {
        keyword: keyword.to_string(),
    })?;
    tracing::debug!(
        keyword,
        file = %entry.name,
        modified_at = %entry.modified_at,
        "latest log selected"
    );
    Ok(entry)
}
