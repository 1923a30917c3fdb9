//! Line-budget pruning for append-only artifacts
//!
//! Keeps the header and the most recent tail, dropping the middle and
//! leaving a single provenance marker behind.

use chrono::NaiveDate;
use lazy_regex::lazy_regex;
use std::path::Path;

use crate::config::EngineSettings;

/// Artifact kind, which decides the line budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Condensed overview, kept short
    Overview,
    /// Append-only history log
    History,
    /// Anything else
    Default,
}

impl ArtifactKind {
    /// Infer the kind from the file name.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.contains("overview") {
            Self::Overview
        } else if name.contains("history") {
            Self::History
        } else {
            Self::Default
        }
    }

    /// Line budget for this kind.
    #[must_use]
    pub const fn budget(self, settings: &EngineSettings) -> usize {
        match self {
            Self::Overview => settings.prune_overview_budget,
            Self::History => settings.prune_history_budget,
            Self::Default => settings.prune_default_budget,
        }
    }
}

/// Result of a prune call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneOutcome {
    /// Rewritten text (unchanged on a no-op)
    pub text: String,
    /// Content lines dropped by this call
    pub removed: usize,
    /// Whether `text` differs from the input; folding stray markers
    /// rewrites the file even when no content line goes.
    pub changed: bool,
}

impl PruneOutcome {
    /// Whether the call left the text untouched.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        !self.changed
    }
}

/// Render the marker line left in place of dropped content.
#[must_use]
pub fn prune_marker(removed: usize, date: NaiveDate) -> String {
    format!("<!-- Pruned {removed} lines on {} -->", date.format("%Y-%m-%d"))
}

fn parse_marker(line: &str) -> Option<usize> {
    static RE_PRUNE_MARKER: lazy_regex::Lazy<regex::Regex> =
        lazy_regex!(r"^<!-- Pruned (\d+) lines on \d{4}-\d{2}-\d{2} -->$");
    RE_PRUNE_MARKER
        .captures(line.trim())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Trim `text` to at most `max_lines` lines.
///
/// The first `header_lines` lines always survive. When a marker from an
/// earlier prune sits in the body, it is folded into the new one so the
/// count stays cumulative. A budget too small to hold the header plus the
/// marker leaves the text alone.
#[must_use]
pub fn prune(text: &str, max_lines: usize, header_lines: usize, date: NaiveDate) -> PruneOutcome {
    let noop = || PruneOutcome {
        text: text.to_string(),
        removed: 0,
        changed: false,
    };

    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines || max_lines < header_lines + 1 {
        return noop();
    }

    let (header, rest) = lines.split_at(header_lines.min(lines.len()));

    let mut previously_removed = 0usize;
    let body: Vec<&str> = rest
        .iter()
        .copied()
        .filter(|line| match parse_marker(line) {
            Some(count) => {
                previously_removed += count;
                false
            }
            None => true,
        })
        .collect();

    let tail_len = max_lines - header_lines - 1;
    let removed = body.len().saturating_sub(tail_len);
    if removed == 0 && previously_removed == 0 {
        return noop();
    }

    let marker = prune_marker(previously_removed + removed, date);
    let mut out: Vec<&str> = Vec::with_capacity(max_lines);
    out.extend_from_slice(header);
    out.push(&marker);
    out.extend_from_slice(&body[removed..]);

    let mut pruned = out.join("\n");
    if text.ends_with('\n') {
        pruned.push('\n');
    }

    PruneOutcome {
        changed: pruned != text,
        text: pruned,
        removed,
    }
}
