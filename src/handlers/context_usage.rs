//! Context usage tracker
//!
//! Before a compaction, measures which loaded context files the session
//! actually used, estimates the tokens spent on the rest and records the
//! usage rate in the telemetry log.

use async_trait::async_trait;
use lazy_regex::lazy_regex;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

use super::read_if_exists;
use crate::hooks::{Event, Hook, HookContext, HookError, HookResult};
use crate::telemetry::TelemetryEntry;

/// Token estimate for a context file without `estimatedTokens` front matter
const DEFAULT_CONTEXT_TOKENS: u64 = 500;

/// Roots searched for a context file, relative to the working directory
const CONTEXT_ROOTS: &[&str] = &["forge-plugin", "."];

/// One loaded context file and how often the session came back to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextUse {
    /// Path as referenced, e.g. `context/python/frameworks.md`
    pub path: String,
    /// Mentions of the file's topic after loading it
    pub mentions: usize,
}

impl ContextUse {
    /// Referenced again after loading.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.mentions > 0
    }
}

/// Context files referenced in `transcript`, in first-seen order, with the
/// number of extra mentions of each file's topic (its stem, with `_` read
/// as a space).
#[must_use]
pub fn context_uses(transcript: &str) -> Vec<ContextUse> {
    static RE_CONTEXT_FILE: lazy_regex::Lazy<regex::Regex> =
        lazy_regex!(r"context/[A-Za-z0-9_-]+/([A-Za-z0-9_-]+)\.md");

    let lower = transcript.to_lowercase();
    let mut seen = BTreeSet::new();
    let mut uses = Vec::new();
    for captures in RE_CONTEXT_FILE.captures_iter(transcript) {
        let (Some(path), Some(stem)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        if !seen.insert(path.as_str()) {
            continue;
        }
        let stem = stem.as_str().to_lowercase();
        let spaced = stem.replace('_', " ");
        let mentions = lower.matches(stem.as_str()).count()
            + if spaced == stem { 0 } else { lower.matches(spaced.as_str()).count() };
        // Every reference to the path itself names the stem once.
        let references = lower.matches(&path.as_str().to_lowercase()).count();
        uses.push(ContextUse {
            path: path.as_str().to_string(),
            mentions: mentions.saturating_sub(references),
        });
    }
    uses
}

/// `estimatedTokens` from a context file's front matter.
#[must_use]
pub fn estimated_tokens(text: &str) -> Option<u64> {
    static RE_ESTIMATE: lazy_regex::Lazy<regex::Regex> =
        lazy_regex!(r"(?m)^estimatedTokens:\s*(\d+)\s*$");
    let front_matter = text.strip_prefix("---")?.split("\n---").next()?;
    RE_ESTIMATE
        .captures(front_matter)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

async fn token_cost(working_dir: &Path, relative: &str) -> Result<u64, HookError> {
    for root in CONTEXT_ROOTS {
        if let Some(text) = read_if_exists(&working_dir.join(root).join(relative)).await? {
            return Ok(estimated_tokens(&text).unwrap_or(DEFAULT_CONTEXT_TOKENS));
        }
    }
    Ok(DEFAULT_CONTEXT_TOKENS)
}

/// Reports context usage before compaction
#[derive(Debug, Default, Clone, Copy)]
pub struct ContextUsageTracker;

#[async_trait]
impl Hook for ContextUsageTracker {
    fn name(&self) -> &'static str {
        "context_usage_tracker"
    }

    async fn handle(&self, event: &Event, context: &HookContext) -> Result<HookResult, HookError> {
        let Some(transcript_path) = event.transcript_path() else {
            return Ok(HookResult::Continue);
        };
        let Some(transcript) = read_if_exists(transcript_path).await? else {
            return Ok(HookResult::Continue);
        };

        let uses = context_uses(&transcript);
        if uses.is_empty() {
            return Ok(HookResult::Continue);
        }

        let mut lines = Vec::new();
        let mut wasted = 0u64;
        for usage in &uses {
            if usage.is_active() {
                lines.push(format!("- active: {} ({} mentions)", usage.path, usage.mentions));
            } else {
                let cost = token_cost(&event.working_dir, &usage.path).await?;
                wasted += cost;
                lines.push(format!("- unused: {} (~{cost} tokens wasted)", usage.path));
            }
        }

        let loaded = uses.len() as u64;
        let active = uses.iter().filter(|u| u.is_active()).count() as u64;
        let entry = TelemetryEntry::context_usage(&event.session_id, context.now, loaded, active, wasted);
        let rate = entry.count(crate::telemetry::keys::USAGE_RATE);
        context.telemetry.append(&entry).await?;
        info!(loaded, active, rate, wasted, "Context usage before compaction");

        let mut report = vec![format!(
            "Context Usage: {active}/{loaded} context files active ({rate}% utilization)"
        )];
        report.extend(lines);
        if wasted > 0 {
            report.push(format!(
                "Estimated wasted tokens: ~{wasted}. Load only the context files the task needs."
            ));
        }
        Ok(HookResult::InjectContext(report.join("\n")))
    }
}
