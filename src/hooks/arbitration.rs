//! Decision arbitration and context merging
//!
//! Folds the outputs of every handler in a cycle into one outcome.

use super::types::{Decision, Permission};

/// Combine decisions: the most severe permission wins (`Deny > Ask > Allow`).
///
/// Reasons of every decision carrying the winning permission are joined with
/// newlines in input order. No decisions means allow.
#[must_use]
pub fn arbitrate<I>(decisions: I) -> Decision
where
    I: IntoIterator<Item = Decision>,
{
    let decisions: Vec<Decision> = decisions.into_iter().collect();
    let permission = decisions
        .iter()
        .map(|d| d.permission)
        .max()
        .unwrap_or(Permission::Allow);

    let reasons: Vec<String> = decisions
        .into_iter()
        .filter(|d| d.permission == permission)
        .filter_map(|d| d.reason)
        .filter(|r| !r.trim().is_empty())
        .collect();

    Decision {
        permission,
        reason: (!reasons.is_empty()).then(|| reasons.join("\n")),
    }
}

/// Merge advisory texts into one block.
///
/// Parts are joined with newlines, adjacent duplicate lines collapse into
/// one, and blank input yields `None`.
#[must_use]
pub fn merge_context<'a, I>(parts: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut lines: Vec<&str> = Vec::new();
    for part in parts {
        for line in part.trim_end().lines() {
            if lines.last() != Some(&line) {
                lines.push(line);
            }
        }
    }

    let merged = lines.join("\n");
    if merged.trim().is_empty() {
        None
    } else {
        Some(merged)
    }
}
