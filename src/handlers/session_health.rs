//! Session health summary
//!
//! At session start, reports warnings left over from the last session and a
//! freshness census of the memory files in the working directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::read_if_exists;
use crate::freshness::{Freshness, FreshnessRecord};
use crate::hooks::{Event, Hook, HookContext, HookError, HookResult};
use crate::paths;

const MAX_WALK_DEPTH: usize = 8;
const SKIPPED_DIRS: &[&str] = &["target", "node_modules"];

/// Summarises health at session start
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionHealthSummary;

/// Knowledge memory files under `root`, sorted.
async fn memory_files(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![(root.to_path_buf(), 0usize)];

    while let Some((dir, depth)) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "Skipping unreadable directory");
                continue;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "Directory listing interrupted");
                    break;
                }
            };
            let path = entry.path();
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };

            if file_type.is_dir() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if depth < MAX_WALK_DEPTH
                    && !name.starts_with('.')
                    && !SKIPPED_DIRS.contains(&name.as_ref())
                {
                    pending.push((path, depth + 1));
                }
            } else if file_type.is_file() && paths::is_knowledge_memory(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    found
}

#[async_trait]
impl Hook for SessionHealthSummary {
    fn name(&self) -> &'static str {
        "session_health_summary"
    }

    async fn handle(&self, event: &Event, context: &HookContext) -> Result<HookResult, HookError> {
        let pending = context.buffer.flush();
        let policy = context.freshness_policy();
        let today = context.today();

        let mut fresh = 0usize;
        let mut aging = 0usize;
        let mut flagged = Vec::new();
        for path in memory_files(&event.working_dir).await {
            let Some(text) = read_if_exists(&path).await? else {
                continue;
            };
            let shown = path
                .strip_prefix(&event.working_dir)
                .unwrap_or(&path)
                .display()
                .to_string();
            let record = FreshnessRecord::from_text(shown, &text, today);
            match record.freshness(&policy, today) {
                Freshness::Fresh => fresh += 1,
                Freshness::Aging => aging += 1,
                Freshness::Stale => flagged.push(record),
            }
        }

        debug!(
            pending = pending.len(),
            fresh,
            aging,
            stale = flagged.len(),
            "Session health census"
        );

        let total = fresh + aging + flagged.len();
        if pending.is_empty() && total == 0 {
            return Ok(HookResult::Continue);
        }

        let mut lines = vec!["Session health".to_string()];
        if !pending.is_empty() {
            lines.push(format!("Pending warnings ({}):", pending.len()));
            lines.extend(pending.iter().map(|entry| format!("- {entry}")));
        }
        if total > 0 {
            lines.push(format!(
                "Memory freshness: {fresh} fresh, {aging} aging, {} stale",
                flagged.len()
            ));
            for record in &flagged {
                lines.push(match record.updated_at {
                    Some(date) => format!(
                        "- {} (last updated {date}, {} days ago)",
                        record.path, record.age_days
                    ),
                    None => format!("- {} (no Last Updated timestamp)", record.path),
                });
            }
        }

        Ok(HookResult::InjectContext(lines.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::HealthBuffer;
    use crate::handlers::test_support::{context, write};
    use crate::hooks::{EventPayload, EventType};

    fn session_start(root: &Path) -> Event {
        Event::new(
            EventType::SessionStart,
            EventPayload::Session {
                source: Some("startup".into()),
                reason: None,
                transcript_path: None,
            },
            "s",
            root,
        )
    }

    #[tokio::test]
    async fn test_empty_project_is_silent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (ctx, _) = context(dir.path());
        let result = SessionHealthSummary
            .handle(&session_start(dir.path()), &ctx)
            .await
            .expect("handled");
        assert_eq!(result, HookResult::Continue);
    }

    #[tokio::test]
    async fn test_reports_census_and_pending_warnings() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "memory/projects/a/overview.md",
            "<!-- Last Updated: 2025-05-25 -->\n# A\n",
        );
        write(
            dir.path(),
            "memory/projects/a/patterns.md",
            "<!-- Last Updated: 2025-04-01 -->\n# P\n",
        );
        write(
            dir.path(),
            "memory/projects/a/review_history.md",
            "<!-- Last Updated: 2024-12-01 -->\n# H\n",
        );
        write(dir.path(), "memory/projects/b/notes.md", "# undated\n");
        write(dir.path(), "memory/index.md", "# index\n");
        write(dir.path(), ".hidden/memory/x.md", "# ignored\n");
        write(dir.path(), "node_modules/pkg/memory/y.md", "# ignored\n");

        let (ctx, buffer) = context(dir.path());
        buffer.append("Memory pruned: memory/x.md dropped 3 old lines (budget 500)");

        let result = SessionHealthSummary
            .handle(&session_start(dir.path()), &ctx)
            .await
            .expect("handled");
        let text = result.context().unwrap_or("");

        assert!(text.starts_with("Session health\nPending warnings (1):\n- ["));
        assert!(text.contains("Memory freshness: 1 fresh, 1 aging, 2 stale"));
        assert!(text.contains("review_history.md (last updated 2024-12-01, 182 days ago)"));
        assert!(text.contains("notes.md (no Last Updated timestamp)"));
        assert!(!text.contains("index.md"));
        assert!(!text.contains(".hidden"));
        assert!(!text.contains("node_modules"));
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_pending_warnings_alone_are_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (ctx, buffer) = context(dir.path());
        buffer.append("Hook fault: x on stop: boom");

        let result = SessionHealthSummary
            .handle(&session_start(dir.path()), &ctx)
            .await
            .expect("handled");
        let text = result.context().unwrap_or("");
        assert!(text.contains("Hook fault: x on stop: boom"));
        assert!(!text.contains("Memory freshness"));
    }
}
