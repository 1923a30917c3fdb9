//! Built-in handlers
//!
//! Each handler is a [`Hook`] referenced from the manifest by its name.

pub mod context_usage;
pub mod dependency_sentinel;
pub mod git_hygiene;
pub mod memory_cross_pollinator;
pub mod memory_freshness;
pub mod memory_pruning;
pub mod memory_quality;
pub mod output_archival;
pub mod output_quality;
pub mod pii_redactor;
pub mod sandbox_guard;
pub mod session_health;
pub mod system_health;
pub mod telemetry;

pub use context_usage::ContextUsageTracker;
pub use dependency_sentinel::DependencySentinel;
pub use git_hygiene::GitHygieneEnforcer;
pub use memory_cross_pollinator::MemoryCrossPollinator;
pub use memory_freshness::MemoryFreshnessEnforcer;
pub use memory_pruning::MemoryPruningDaemon;
pub use memory_quality::MemoryQualityGate;
pub use output_archival::OutputArchival;
pub use output_quality::OutputQualityScorer;
pub use pii_redactor::PiiRedactor;
pub use sandbox_guard::SandboxBoundaryGuard;
pub use session_health::SessionHealthSummary;
pub use system_health::SystemHealthEmitter;
pub use telemetry::ForgeTelemetry;

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::hooks::{Event, EventPayload, HandlerCatalog, HookError};
use crate::utils::replace_file;

/// Catalog of every built-in handler.
#[must_use]
pub fn builtin_catalog() -> HandlerCatalog {
    HandlerCatalog::new()
        .with(Arc::new(MemoryFreshnessEnforcer))
        .with(Arc::new(SandboxBoundaryGuard))
        .with(Arc::new(GitHygieneEnforcer))
        .with(Arc::new(DependencySentinel))
        .with(Arc::new(MemoryQualityGate))
        .with(Arc::new(MemoryCrossPollinator))
        .with(Arc::new(OutputQualityScorer))
        .with(Arc::new(OutputArchival))
        .with(Arc::new(SystemHealthEmitter))
        .with(Arc::new(PiiRedactor))
        .with(Arc::new(MemoryPruningDaemon))
        .with(Arc::new(ForgeTelemetry))
        .with(Arc::new(SessionHealthSummary))
        .with(Arc::new(ContextUsageTracker))
}

/// Shell command of a `Bash` tool event, trimmed.
pub(crate) fn bash_command(event: &Event) -> Option<&str> {
    if event.tool_name.as_deref() != Some("Bash") {
        return None;
    }
    match &event.payload {
        EventPayload::Tool { input, .. } => input.get("command").and_then(Value::as_str).map(str::trim),
        _ => None,
    }
}

/// Split a shell command line into simple commands at `&&`, `||`, `|`,
/// `;` and newlines, then into words. Quotes group words and are removed;
/// separators inside quotes do not split.
pub(crate) fn shell_segments(command: &str) -> Vec<Vec<String>> {
    let mut segments = Vec::new();
    let mut words: Vec<String> = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = command.chars().peekable();

    let end_word = |words: &mut Vec<String>, word: &mut String, in_word: &mut bool| {
        if *in_word {
            words.push(std::mem::take(word));
            *in_word = false;
        }
    };

    while let Some(c) = chars.next() {
        if let Some(open) = quote {
            if c == open {
                quote = None;
            } else if c == '\\' && open == '"' && chars.peek() == Some(&'"') {
                word.push('"');
                chars.next();
            } else {
                word.push(c);
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                in_word = true;
            }
            '&' if chars.peek() == Some(&'&') => {
                chars.next();
                end_word(&mut words, &mut word, &mut in_word);
                segments.push(std::mem::take(&mut words));
            }
            '|' | ';' | '\n' => {
                if c == '|' && chars.peek() == Some(&'|') {
                    chars.next();
                }
                end_word(&mut words, &mut word, &mut in_word);
                segments.push(std::mem::take(&mut words));
            }
            c if c.is_whitespace() => end_word(&mut words, &mut word, &mut in_word),
            c => {
                word.push(c);
                in_word = true;
            }
        }
    }
    end_word(&mut words, &mut word, &mut in_word);
    segments.push(words);
    segments.retain(|segment| !segment.is_empty());
    segments
}

/// Read a text file; a missing file is `None`, not an error.
pub(crate) async fn read_if_exists(path: &Path) -> Result<Option<String>, HookError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(HookError::io(path, err)),
    }
}

/// Overwrite a text file atomically; the parent directory must exist.
pub(crate) async fn write_text(path: &Path, text: &str) -> Result<(), HookError> {
    let target = path.to_path_buf();
    let contents = text.to_owned();
    tokio::task::spawn_blocking(move || replace_file(&target, contents.as_bytes()))
        .await
        .map_err(|err| HookError::io(path, std::io::Error::other(err)))?
        .map_err(|err| HookError::io(path, err))
}
