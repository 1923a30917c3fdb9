//! Staleness classification for timestamped artifacts
//!
//! Artifacts carry a leading metadata line `<!-- Last Updated: YYYY-MM-DD -->`.
//! Classification is a pure function of `(updated_at, now)`; nothing here
//! reads a clock.

use chrono::NaiveDate;
use lazy_regex::lazy_regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{AGING_MAX_DAYS, FRESH_MAX_DAYS};

/// Literal prefix of the leading metadata line
pub const LAST_UPDATED_PREFIX: &str = "<!-- Last Updated:";

/// Freshness bucket of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Updated within the fresh window
    Fresh,
    /// Old enough to warrant a warning
    Aging,
    /// Too old (or undated) to rely on
    Stale,
}

impl Freshness {
    /// Lowercase label used in messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Aging => "aging",
            Self::Stale => "stale",
        }
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket boundaries. Each bound is the last day (inclusive) of its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    /// Last day counted as fresh
    pub fresh_days: i64,
    /// Last day counted as aging
    pub aging_days: i64,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            fresh_days: FRESH_MAX_DAYS,
            aging_days: AGING_MAX_DAYS,
        }
    }
}

impl FreshnessPolicy {
    /// Classify an optional update date against `now`.
    ///
    /// A missing date is always stale. Dates in the future count as age 0.
    #[must_use]
    pub fn classify(&self, updated_at: Option<NaiveDate>, now: NaiveDate) -> Freshness {
        let Some(updated_at) = updated_at else {
            return Freshness::Stale;
        };

        let age = age_days(updated_at, now);
        if age <= self.fresh_days {
            Freshness::Fresh
        } else if age <= self.aging_days {
            Freshness::Aging
        } else {
            Freshness::Stale
        }
    }
}

/// Classify with the default 30/90 day policy.
#[must_use]
pub fn classify(updated_at: Option<NaiveDate>, now: NaiveDate) -> Freshness {
    FreshnessPolicy::default().classify(updated_at, now)
}

fn age_days(updated_at: NaiveDate, now: NaiveDate) -> i64 {
    (now - updated_at).num_days().max(0)
}

/// Freshness facts about one artifact, derived on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshnessRecord {
    /// Artifact path as given by the caller
    pub path: String,
    /// Date from the leading metadata line, if any
    pub updated_at: Option<NaiveDate>,
    /// Whole days since the update (0 when undated)
    pub age_days: i64,
}

impl FreshnessRecord {
    /// Derive the record from the artifact text.
    #[must_use]
    pub fn from_text(path: impl Into<String>, text: &str, now: NaiveDate) -> Self {
        let updated_at = parse_last_updated(text);
        Self {
            path: path.into(),
            updated_at,
            age_days: updated_at.map_or(0, |date| age_days(date, now)),
        }
    }

    /// Bucket under the given policy.
    #[must_use]
    pub fn freshness(&self, policy: &FreshnessPolicy, now: NaiveDate) -> Freshness {
        policy.classify(self.updated_at, now)
    }
}

/// Extract the date from the first line of `text`, if it carries one.
#[must_use]
pub fn parse_last_updated(text: &str) -> Option<NaiveDate> {
    static RE_LAST_UPDATED: lazy_regex::Lazy<regex::Regex> =
        lazy_regex!(r"^\s*<!--\s*Last Updated:\s*(\d{4}-\d{2}-\d{2})\s*-->");

    let first_line = text.lines().next()?;
    let captures = RE_LAST_UPDATED.captures(first_line)?;
    NaiveDate::parse_from_str(captures.get(1)?.as_str(), "%Y-%m-%d").ok()
}

/// Render the leading metadata line for `date`.
#[must_use]
pub fn last_updated_line(date: NaiveDate) -> String {
    format!("{LAST_UPDATED_PREFIX} {} -->", date.format("%Y-%m-%d"))
}

/// Insert or refresh the leading metadata line.
///
/// Returns `None` when the text already carries `today`'s stamp.
#[must_use]
pub fn stamp_last_updated(text: &str, today: NaiveDate) -> Option<String> {
    if parse_last_updated(text) == Some(today) {
        return None;
    }

    let stamp = last_updated_line(today);
    let first_is_stamp = text
        .lines()
        .next()
        .is_some_and(|line| line.trim_start().starts_with(LAST_UPDATED_PREFIX));

    let body = if first_is_stamp {
        text.split_once('\n').map_or("", |(_, rest)| rest)
    } else {
        text
    };

    Some(format!("{stamp}\n{body}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
    }

    fn ago(now: NaiveDate, days: i64) -> Option<NaiveDate> {
        Some(now - Duration::days(days))
    }

    #[test]
    fn test_boundaries_are_inclusive_on_lower_bucket() {
        let now = day(2025, 6, 1);
        assert_eq!(classify(ago(now, 0), now), Freshness::Fresh);
        assert_eq!(classify(ago(now, 29), now), Freshness::Fresh);
        assert_eq!(classify(ago(now, 30), now), Freshness::Fresh);
        assert_eq!(classify(ago(now, 31), now), Freshness::Aging);
        assert_eq!(classify(ago(now, 45), now), Freshness::Aging);
        assert_eq!(classify(ago(now, 90), now), Freshness::Aging);
        assert_eq!(classify(ago(now, 91), now), Freshness::Stale);
        assert_eq!(classify(ago(now, 180), now), Freshness::Stale);
    }

    #[test]
    fn test_missing_date_is_stale() {
        assert_eq!(classify(None, day(2025, 6, 1)), Freshness::Stale);
    }

    #[test]
    fn test_future_date_is_fresh() {
        let now = day(2025, 6, 1);
        assert_eq!(classify(Some(day(2025, 7, 1)), now), Freshness::Fresh);
    }

    #[test]
    fn test_custom_policy() {
        let policy = FreshnessPolicy {
            fresh_days: 7,
            aging_days: 14,
        };
        let now = day(2025, 6, 1);
        assert_eq!(policy.classify(ago(now, 8), now), Freshness::Aging);
        assert_eq!(policy.classify(ago(now, 15), now), Freshness::Stale);
    }

    #[test]
    fn test_parses_leading_metadata_line() {
        let text = "<!-- Last Updated: 2025-01-15 -->\n# Overview\n";
        assert_eq!(parse_last_updated(text), Some(day(2025, 1, 15)));
    }

    #[test]
    fn test_metadata_must_be_first_line() {
        let text = "# Overview\n<!-- Last Updated: 2025-01-15 -->\n";
        assert_eq!(parse_last_updated(text), None);
        assert_eq!(parse_last_updated(""), None);
        assert_eq!(parse_last_updated("<!-- Last Updated: 2025-13-45 -->"), None);
    }

    #[test]
    fn test_record_from_text() {
        let now = day(2025, 6, 1);
        let record = FreshnessRecord::from_text("a.md", "<!-- Last Updated: 2025-05-02 -->\n", now);
        assert_eq!(record.age_days, 30);
        assert_eq!(
            record.freshness(&FreshnessPolicy::default(), now),
            Freshness::Fresh
        );

        let undated = FreshnessRecord::from_text("b.md", "# No stamp\n", now);
        assert_eq!(undated.updated_at, None);
        assert_eq!(undated.age_days, 0);
    }

    #[test]
    fn test_stamp_injects_when_missing() {
        let today = day(2025, 6, 1);
        let stamped = stamp_last_updated("# Overview\n\nSome content\n", today);
        assert_eq!(
            stamped.as_deref(),
            Some("<!-- Last Updated: 2025-06-01 -->\n# Overview\n\nSome content\n")
        );
    }

    #[test]
    fn test_stamp_refreshes_old_date() {
        let today = day(2025, 6, 1);
        let stamped =
            stamp_last_updated("<!-- Last Updated: 2020-01-01 -->\n# Overview\n", today);
        let stamped = stamped.unwrap_or_default();
        assert!(stamped.contains("2025-06-01"));
        assert!(!stamped.contains("2020-01-01"));
        assert_eq!(stamped.lines().count(), 2);
    }

    #[test]
    fn test_stamp_is_noop_when_current() {
        let today = day(2025, 6, 1);
        assert_eq!(
            stamp_last_updated("<!-- Last Updated: 2025-06-01 -->\nbody\n", today),
            None
        );
    }
}
