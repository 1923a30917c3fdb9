//! Session telemetry
//!
//! Counts tool, skill, memory, context and command activity in a session
//! transcript and appends one block per session to a capped log.

use chrono::{DateTime, SecondsFormat, Utc};
use lazy_regex::lazy_regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::utils::replace_file;

/// Line that opens every entry in the log
pub const ENTRY_SEPARATOR: &str = "---";

/// Counter keys other than the per-tool ones
pub mod keys {
    /// Total tool invocations
    pub const TOOLS_TOTAL: &str = "tools.total";
    /// Distinct skills loaded
    pub const SKILLS: &str = "skills";
    /// Memory file operations
    pub const MEMORY: &str = "memory";
    /// Distinct context files loaded
    pub const CONTEXT: &str = "context";
    /// Distinct slash commands issued
    pub const COMMANDS: &str = "commands";
    /// Context files loaded before a compaction
    pub const CONTEXT_LOADED: &str = "context_loaded";
    /// Loaded context files referenced again after loading
    pub const CONTEXT_ACTIVE: &str = "context_active";
    /// Share of loaded context files that were active, in percent
    pub const USAGE_RATE: &str = "usage_rate";
    /// Estimated tokens spent on context files never used
    pub const WASTED_TOKENS: &str = "wasted_tokens";
}

/// What an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Activity counters of a finished session
    Session,
    /// Context file usage measured before a compaction
    ContextUsage,
}

impl EntryKind {
    /// Name written on the entry's `event:` line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session_summary",
            Self::ContextUsage => "context_usage_report",
        }
    }
}

/// Errors from the telemetry log writer
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Reading or writing the log failed
    #[error("telemetry log I/O failed for {path}: {source}")]
    Io {
        /// Log path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// One session's counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryEntry {
    /// What the counters describe
    pub kind: EntryKind,
    /// When the entry was produced
    pub timestamp: DateTime<Utc>,
    /// Session the transcript belongs to
    pub session_id: String,
    /// Counter name to value
    pub counters: BTreeMap<String, u64>,
}

impl TelemetryEntry {
    /// Context usage report for one compaction.
    #[must_use]
    pub fn context_usage(
        session_id: &str,
        timestamp: DateTime<Utc>,
        loaded: u64,
        active: u64,
        wasted_tokens: u64,
    ) -> Self {
        let rate = if loaded == 0 { 0 } else { active * 100 / loaded };
        let counters = [
            (keys::CONTEXT_LOADED, loaded),
            (keys::CONTEXT_ACTIVE, active),
            (keys::USAGE_RATE, rate),
            (keys::WASTED_TOKENS, wasted_tokens),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();
        Self {
            kind: EntryKind::ContextUsage,
            timestamp,
            session_id: session_id.to_string(),
            counters,
        }
    }

    /// Value of a counter, zero when absent.
    #[must_use]
    pub fn count(&self, key: &str) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }

    fn tool_counts(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counters
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix("tools.")
                    .filter(|name| *name != "total")
                    .map(|name| (name, *value))
            })
    }

    fn session_line(&self) -> String {
        format!("session: {}", self.session_id.replace(['\r', '\n'], " "))
    }

    /// Render the entry as a log block (no trailing newline).
    #[must_use]
    pub fn render(&self) -> String {
        if self.kind == EntryKind::ContextUsage {
            let mut lines = vec![
                ENTRY_SEPARATOR.to_string(),
                format!(
                    "timestamp: {}",
                    self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
                ),
                format!("event: {}", self.kind.as_str()),
                self.session_line(),
            ];
            lines.extend(
                [keys::CONTEXT_LOADED, keys::CONTEXT_ACTIVE, keys::USAGE_RATE, keys::WASTED_TOKENS]
                    .iter()
                    .map(|key| format!("{key}: {}", self.count(key))),
            );
            return lines.join("\n");
        }

        let tools: Vec<String> = self
            .tool_counts()
            .map(|(name, value)| format!("{name}:{value}"))
            .collect();
        let tools = if tools.is_empty() {
            self.count(keys::TOOLS_TOTAL).to_string()
        } else {
            format!("{} ({})", self.count(keys::TOOLS_TOTAL), tools.join(" "))
        };

        [
            ENTRY_SEPARATOR.to_string(),
            format!(
                "timestamp: {}",
                self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            self.session_line(),
            format!("tools: {tools}"),
            format!("skills: {}", self.count(keys::SKILLS)),
            format!("memory: {}", self.count(keys::MEMORY)),
            format!("context: {}", self.count(keys::CONTEXT)),
            format!("commands: {}", self.count(keys::COMMANDS)),
        ]
        .join("\n")
    }

    /// One-line summary for the health buffer.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Telemetry: session {} used {} tool call(s), {} skill(s), {} memory op(s), {} context file(s), {} command(s)",
            self.session_id,
            self.count(keys::TOOLS_TOTAL),
            self.count(keys::SKILLS),
            self.count(keys::MEMORY),
            self.count(keys::CONTEXT),
            self.count(keys::COMMANDS),
        )
    }
}

/// Count activity markers in a transcript.
#[must_use]
pub fn aggregate(transcript: &str, session_id: &str, now: DateTime<Utc>) -> TelemetryEntry {
    static RE_TOOL: lazy_regex::Lazy<regex::Regex> =
        lazy_regex!(r#""tool_name"\s*:?\s*"([A-Za-z0-9_.:-]+)""#);
    static RE_SKILL: lazy_regex::Lazy<regex::Regex> =
        lazy_regex!(r"skills/([A-Za-z0-9_-]+)/SKILL\.md");
    static RE_MEMORY: lazy_regex::Lazy<regex::Regex> =
        lazy_regex!(r"(?:^|[\s/])memory/[^\s\x22']+\.md");
    static RE_CONTEXT: lazy_regex::Lazy<regex::Regex> =
        lazy_regex!(r"(?:^|[\s/])(context/[^\s\x22']+\.md)");
    static RE_COMMAND: lazy_regex::Lazy<regex::Regex> =
        lazy_regex!(r"(?m)^/([a-z][a-z0-9_-]*)(?:\s|$)");

    let mut counters = BTreeMap::new();

    let mut total = 0u64;
    for captures in RE_TOOL.captures_iter(transcript) {
        if let Some(name) = captures.get(1) {
            total += 1;
            *counters
                .entry(format!("tools.{}", name.as_str()))
                .or_insert(0) += 1;
        }
    }
    counters.insert(keys::TOOLS_TOTAL.to_string(), total);

    let distinct = |re: &regex::Regex| -> u64 {
        let found: BTreeSet<&str> = re
            .captures_iter(transcript)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        found.len() as u64
    };

    counters.insert(keys::SKILLS.to_string(), distinct(&*RE_SKILL));
    counters.insert(
        keys::MEMORY.to_string(),
        RE_MEMORY.find_iter(transcript).count() as u64,
    );
    counters.insert(keys::CONTEXT.to_string(), distinct(&*RE_CONTEXT));
    counters.insert(keys::COMMANDS.to_string(), distinct(&*RE_COMMAND));

    TelemetryEntry {
        kind: EntryKind::Session,
        timestamp: now,
        session_id: session_id.to_string(),
        counters,
    }
}

/// Append `entry` to the log text, dropping the oldest entries until both
/// caps hold.
///
/// Lines before the first separator (a hand-edited or legacy preamble) are
/// treated as one entry and are the first to go.
#[must_use]
pub fn append_entry(
    log: &str,
    entry: &TelemetryEntry,
    max_entries: usize,
    max_lines: usize,
) -> String {
    let mut entries: Vec<Vec<&str>> = Vec::new();
    for line in log.lines() {
        if line == ENTRY_SEPARATOR || entries.is_empty() {
            entries.push(Vec::new());
        }
        if let Some(current) = entries.last_mut() {
            current.push(line);
        }
    }
    entries.retain(|lines| lines.iter().any(|l| !l.trim().is_empty()));

    let rendered = entry.render();
    entries.push(rendered.lines().collect());

    let mut line_count: usize = entries.iter().map(Vec::len).sum();
    let mut drop = 0;
    // The newest entry always survives, even when it alone breaks a cap.
    while drop + 1 < entries.len()
        && (entries.len() - drop > max_entries || line_count > max_lines)
    {
        line_count -= entries[drop].len();
        drop += 1;
    }

    let mut out = entries[drop..]
        .iter()
        .map(|lines| lines.join("\n"))
        .collect::<Vec<_>>()
        .join("\n");
    out.push('\n');
    out
}

/// Single writer for the telemetry log file.
#[derive(Debug)]
pub struct TelemetryLog {
    path: PathBuf,
    max_entries: usize,
    max_lines: usize,
    write_lock: Mutex<()>,
}

impl TelemetryLog {
    /// Create a writer for `path` with the given caps.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, max_entries: usize, max_lines: usize) -> Self {
        Self {
            path: path.into(),
            max_entries,
            max_lines,
            write_lock: Mutex::new(()),
        }
    }

    /// Log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry, rotating the file when a cap is exceeded.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Io`] when the log cannot be read or written.
    pub async fn append(&self, entry: &TelemetryEntry) -> Result<(), TelemetryError> {
        let _guard = self.write_lock.lock().await;
        let io_err = |source| TelemetryError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }

        let existing = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(io_err(err)),
        };

        let updated = append_entry(&existing, entry, self.max_entries, self.max_lines);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || replace_file(&path, updated.as_bytes()))
            .await
            .map_err(|err| io_err(std::io::Error::other(err)))?
            .map_err(io_err)?;

        debug!(
            path = %self.path.display(),
            session_id = %entry.session_id,
            "Telemetry entry appended"
        );
        Ok(())
    }
}
