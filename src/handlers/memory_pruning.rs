//! Memory pruning daemon
//!
//! At session end, trims every memory file the session touched back to the
//! line budget of its kind.

use async_trait::async_trait;
use lazy_regex::lazy_regex;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::info;

use super::{read_if_exists, write_text};
use crate::hooks::{Event, Hook, HookContext, HookError, HookResult};
use crate::paths;
use crate::pruning::{prune, ArtifactKind};

/// Prunes memory files referenced in the session transcript
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryPruningDaemon;

/// Distinct memory file references in a transcript, in first-seen order.
#[must_use]
pub fn referenced_memory_files(transcript: &str) -> Vec<String> {
    static RE_MEMORY_REF: lazy_regex::Lazy<regex::Regex> =
        lazy_regex!(r"[^\s\x22'`(\[]*memory/[^\s\x22'`)\],]+\.md");

    let mut seen = BTreeSet::new();
    RE_MEMORY_REF
        .find_iter(transcript)
        .map(|m| m.as_str().to_string())
        .filter(|path| seen.insert(path.clone()))
        .collect()
}

#[async_trait]
impl Hook for MemoryPruningDaemon {
    fn name(&self) -> &'static str {
        "memory_pruning_daemon"
    }

    async fn handle(&self, event: &Event, context: &HookContext) -> Result<HookResult, HookError> {
        let Some(transcript_path) = event.transcript_path() else {
            return Ok(HookResult::Continue);
        };
        let Some(transcript) = read_if_exists(transcript_path).await? else {
            return Ok(HookResult::Continue);
        };

        let settings = &context.settings;
        let mut targets: Vec<PathBuf> = referenced_memory_files(&transcript)
            .iter()
            .map(|raw| paths::resolve(&event.working_dir, raw))
            .filter(|path| paths::is_knowledge_memory(path))
            .collect();
        targets.dedup();

        let mut pruned = Vec::new();
        for path in targets {
            let Some(text) = read_if_exists(&path).await? else {
                continue;
            };
            let budget = ArtifactKind::from_path(&path).budget(settings);
            let outcome = prune(&text, budget, settings.prune_header_lines, context.today());
            if outcome.is_noop() {
                continue;
            }

            write_text(&path, &outcome.text).await?;
            let shown = path
                .strip_prefix(&event.working_dir)
                .unwrap_or(&path)
                .display()
                .to_string();
            info!(path = %shown, removed = outcome.removed, budget, "Pruned memory file");
            context.buffer.append(&if outcome.removed == 0 {
                format!("Memory pruned: {shown} folded earlier prune markers (budget {budget})")
            } else {
                format!(
                    "Memory pruned: {shown} dropped {} old lines (budget {budget})",
                    outcome.removed
                )
            });
            pruned.push(shown);
        }

        if pruned.is_empty() {
            Ok(HookResult::Continue)
        } else {
            Ok(HookResult::InjectContext(format!(
                "Pruned {} memory file(s): {}",
                pruned.len(),
                pruned.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::HealthBuffer;
    use crate::handlers::test_support::{context, write};
    use crate::hooks::{EventPayload, EventType};

    fn session_end(root: &std::path::Path, transcript: Option<PathBuf>) -> Event {
        Event::new(
            EventType::SessionEnd,
            EventPayload::Session {
                source: None,
                reason: Some("exit".into()),
                transcript_path: transcript,
            },
            "s",
            root,
        )
    }

    fn numbered(lines: usize) -> String {
        (1..=lines).map(|i| format!("line {i}\n")).collect()
    }

    #[test]
    fn test_finds_distinct_references() {
        let transcript = "Read memory/projects/a/overview.md\n\
                          {\"file_path\":\"/repo/memory/projects/a/review_history.md\"}\n\
                          Edit memory/projects/a/overview.md\n\
                          Read src/memory.rs\n";
        assert_eq!(
            referenced_memory_files(transcript),
            vec![
                "memory/projects/a/overview.md".to_string(),
                "/repo/memory/projects/a/review_history.md".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_prunes_referenced_files_to_kind_budget() {
        let dir = tempfile::tempdir().expect("tempdir");
        let overview = write(dir.path(), "memory/projects/a/project_overview.md", &numbered(260));
        let history = write(dir.path(), "memory/projects/a/review_history.md", &numbered(250));
        let untouched = write(dir.path(), "memory/projects/a/codebase_patterns.md", &numbered(700));
        let transcript = write(
            dir.path(),
            "transcript.jsonl",
            "Read memory/projects/a/project_overview.md\nWrite memory/projects/a/review_history.md\n",
        );
        let (ctx, buffer) = context(dir.path());

        let result = MemoryPruningDaemon
            .handle(&session_end(dir.path(), Some(transcript)), &ctx)
            .await
            .expect("handled");

        let overview_text = std::fs::read_to_string(overview).unwrap_or_default();
        assert_eq!(overview_text.lines().count(), 200);
        assert!(overview_text.contains("<!-- Pruned 61 lines on 2025-06-01 -->"));
        assert!(overview_text.ends_with("line 260\n"));

        assert_eq!(std::fs::read_to_string(history).unwrap_or_default(), numbered(250));
        assert_eq!(std::fs::read_to_string(untouched).unwrap_or_default(), numbered(700));

        assert!(result.context().unwrap_or("").contains("project_overview.md"));
        let notices = buffer.flush();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.contains("dropped 61 old lines"));
    }

    #[tokio::test]
    async fn test_missing_transcript_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (ctx, buffer) = context(dir.path());

        for transcript in [None, Some(dir.path().join("nope.jsonl"))] {
            let result = MemoryPruningDaemon
                .handle(&session_end(dir.path(), transcript), &ctx)
                .await
                .expect("handled");
            assert_eq!(result, HookResult::Continue);
        }
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_marker_folding_is_written_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut text = String::from("# Overview\n\n\n\n\n");
        text.push_str("<!-- Pruned 30 lines on 2025-03-01 -->\n");
        text.push_str("<!-- Pruned 12 lines on 2025-04-01 -->\n");
        text.push_str(&numbered(194));
        let overview = write(dir.path(), "memory/projects/a/project_overview.md", &text);
        let transcript = write(dir.path(), "t.txt", "Edit memory/projects/a/project_overview.md\n");
        let (ctx, buffer) = context(dir.path());

        let result = MemoryPruningDaemon
            .handle(&session_end(dir.path(), Some(transcript)), &ctx)
            .await
            .expect("handled");

        let rewritten = std::fs::read_to_string(overview).unwrap_or_default();
        assert_eq!(rewritten.lines().count(), 200);
        assert_eq!(rewritten.matches("<!-- Pruned").count(), 1);
        assert!(rewritten.contains("<!-- Pruned 42 lines on 2025-06-01 -->"));
        assert!(rewritten.ends_with("line 194\n"));
        assert!(result.context().is_some());
        let notices = buffer.flush();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.contains("folded earlier prune markers"));
    }

    #[tokio::test]
    async fn test_operational_files_are_never_pruned() {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = write(dir.path(), "memory/index.md", &numbered(900));
        let transcript = write(dir.path(), "t.txt", "Read memory/index.md\n");
        let (ctx, _) = context(dir.path());

        let result = MemoryPruningDaemon
            .handle(&session_end(dir.path(), Some(transcript)), &ctx)
            .await
            .expect("handled");
        assert_eq!(result, HookResult::Continue);
        assert_eq!(std::fs::read_to_string(index).unwrap_or_default(), numbered(900));
    }
}
