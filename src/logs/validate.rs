//! Freshness gate between the content-matched and reference categories.
//!
//! A lookup that matched a stale log while the reference log is fresh (or
//! the other way round) means the two sources describe different runs. The
//! batch is rejected as a policy decision, not a failure of any transfer.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::discovery::Discovery;
use super::error::FetchError;

/// Outcome of comparing two representative times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub accepted: bool,
    pub skew: Duration,
    pub reason: Option<String>,
}

/// Rejects pairs of timestamps further apart than `max_skew`.
///
/// A skew exactly equal to `max_skew` is accepted.
#[derive(Debug, Clone, Copy)]
pub struct SkewGate {
    max_skew: Duration,
}

impl SkewGate {
    pub fn new(max_skew: Duration) -> Self {
        Self { max_skew }
    }

    pub fn check(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> ValidationOutcome {
        let skew = skew_between(a, b);
        if skew > self.max_skew {
            ValidationOutcome {
                accepted: false,
                skew,
                reason: Some(format!(
                    "skew of {}s exceeds {}s",
                    ceil_secs(skew),
                    self.max_skew.as_secs()
                )),
            }
        } else {
            ValidationOutcome {
                accepted: true,
                skew,
                reason: None,
            }
        }
    }

    /// Check the content category against the reference category.
    ///
    /// Both must be present in `discovery`; a missing one is reported as
    /// not found.
    pub fn validate(
        &self,
        discovery: &Discovery,
        content_keyword: &str,
        reference_keyword: &str,
    ) -> Result<ValidationOutcome, FetchError> {
        let time_of = |keyword: &str| {
            discovery
                .selection(keyword)
                .map(|s| s.representative_time)
                .ok_or_else(|| FetchError::CategoryNotFound {
                    keyword: keyword.to_string(),
                })
        };
        let content = time_of(content_keyword)?;
        let reference = time_of(reference_keyword)?;

        let outcome = self.check(content, reference);
        tracing::info!(
            content = content_keyword,
            reference = reference_keyword,
            skew_secs = outcome.skew.as_secs(),
            accepted = outcome.accepted,
            "skew gate evaluated"
        );

        if outcome.accepted {
            Ok(outcome)
        } else {
            tracing::warn!(
                content = content_keyword,
                reference = reference_keyword,
                reason = outcome.reason.as_deref().unwrap_or_default(),
                "batch rejected by skew gate"
            );
            Err(FetchError::ConsistencyViolation {
                content_keyword: content_keyword.to_string(),
                reference_keyword: reference_keyword.to_string(),
                skew_secs: ceil_secs(outcome.skew),
                max_skew_secs: self.max_skew.as_secs(),
            })
        }
    }
}

/// Whole seconds, rounded up so a rejected skew never prints as the limit.
fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

/// Absolute distance between two instants.
pub fn skew_between(a: DateTime<Utc>, b: DateTime<Utc>) -> Duration {
    let delta = if a >= b { a - b } else { b - a };
    delta.to_std().unwrap_or(Duration::MAX)
}
