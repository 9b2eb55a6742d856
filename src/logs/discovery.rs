//! Discovery orchestrator: fan out one task per category, join, decide.
//!
//! Each category task returns its [`SelectionResult`] (or error) through
//! rayon's ordered collect. Aggregation happens on the calling thread after
//! every task has finished, so no task ever sees another's partial result.

use std::collections::HashSet;

use rayon::prelude::*;
use serde::Serialize;

use super::catalog::Catalog;
use super::category::{Category, SelectionResult};
use super::error::FetchError;
use crate::remote::RemoteFs;

/// One file to download and the category that selected it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub keyword: String,
}

/// Complete result of a successful discovery phase.
#[derive(Debug, Clone)]
pub struct Discovery {
    selections: Vec<SelectionResult>,
}

impl Discovery {
    /// Selections in configured category order.
    pub fn selections(&self) -> &[SelectionResult] {
        &self.selections
    }

    pub fn selection(&self, keyword: &str) -> Option<&SelectionResult> {
        self.selections.iter().find(|s| s.keyword() == keyword)
    }

    /// Every selected file, category order then catalog order.
    ///
    /// A file picked by two categories appears once, under the first.
    pub fn manifest(&self) -> Vec<ManifestEntry> {
        let mut seen = HashSet::new();
        self.selections
            .iter()
            .flat_map(|s| s.names.iter().map(move |n| (s.keyword(), n)))
            .filter(|&(_, name)| seen.insert(name.as_str()))
            .map(|(keyword, name)| ManifestEntry {
                name: name.clone(),
                keyword: keyword.to_string(),
            })
            .collect()
    }
}

/// Run every category against `catalog` and join the results.
///
/// All tasks run to completion before any decision. If any category
/// failed, the content-matched category's error wins, then the reference
/// category's, then the first failure in configured order.
pub fn discover(
    remote: &dyn RemoteFs,
    catalog: &Catalog,
    categories: &[Category],
    reference_keyword: &str,
    lookup_key: &str,
) -> Result<Discovery, FetchError> {
    let results: Vec<Result<SelectionResult, FetchError>> = categories
        .par_iter()
        .map(|category| category.discover(remote, catalog, lookup_key))
        .collect();

    let mut selections = Vec::with_capacity(results.len());
    let mut failures: Vec<(&Category, FetchError)> = Vec::new();
    for (category, result) in categories.iter().zip(results) {
        match result {
            Ok(selection) => {
                tracing::debug!(
                    keyword = category.keyword(),
                    files = selection.names.len(),
                    "category discovered"
                );
                selections.push(selection);
            }
            Err(err) => {
                tracing::warn!(keyword = category.keyword(), error = %err, "category failed");
                failures.push((category, err));
            }
        }
    }

    if failures.is_empty() {
        return Ok(Discovery { selections });
    }

    let rank = |category: &Category| {
        if category.is_content_match() {
            0
        } else if category.keyword() == reference_keyword {
            1
        } else {
            2
        }
    };
    // Stable sort keeps configured order within a rank.
    failures.sort_by_key(|(category, _)| rank(category));
    let (_, err) = failures.swap_remove(0);
    Err(err)
}
