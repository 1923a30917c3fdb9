//! Memory quality gate
//!
//! After a memory file is written: refresh its timestamp and flag entries
//! that will not age well. Advisory only.

use async_trait::async_trait;
use lazy_regex::lazy_regex;
use std::path::Path;
use tracing::debug;

use super::{read_if_exists, write_text};
use crate::freshness::stamp_last_updated;
use crate::hooks::{Event, Hook, HookContext, HookError, HookResult};
use crate::paths;
use crate::pruning::ArtifactKind;

/// Vague phrases tolerated before the gate complains
const VAGUE_PHRASE_LIMIT: usize = 3;

/// Stamps memory writes and warns on weak entries
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryQualityGate;

/// Quality warnings for memory text at `path`.
#[must_use]
pub fn review(path: &Path, text: &str, budget: usize) -> Vec<String> {
    static RE_VAGUE: lazy_regex::Lazy<regex::Regex> =
        lazy_regex!(r"(?i)\b(?:custom|some|various|several|stuff|things|etc)\b");
    static RE_ABSOLUTE_HOME: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"(?:/home/|/Users/)\S*");

    let name = path
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    let mut warnings = Vec::new();

    let lines = text.lines().count();
    if lines > budget {
        warnings.push(format!(
            "{name} has {lines} lines, over its {budget}-line limit; older entries will be pruned at session end"
        ));
    }

    let vague = RE_VAGUE.find_iter(text).count();
    if vague >= VAGUE_PHRASE_LIMIT {
        warnings.push(format!(
            "{name} has {vague} vague phrases (custom, some, various, ...); name the concrete pattern, library or file instead"
        ));
    }

    if let Some(found) = RE_ABSOLUTE_HOME.find(text) {
        warnings.push(format!(
            "{name} contains an absolute path ({}); use project-relative paths so memory stays portable",
            found.as_str()
        ));
    }

    warnings
}

#[async_trait]
impl Hook for MemoryQualityGate {
    fn name(&self) -> &'static str {
        "memory_quality_gate"
    }

    async fn handle(&self, event: &Event, context: &HookContext) -> Result<HookResult, HookError> {
        let Some(raw) = event.file_path() else {
            return Ok(HookResult::Continue);
        };
        let path = paths::resolve(&event.working_dir, raw);
        if !paths::is_knowledge_memory(&path) {
            return Ok(HookResult::Continue);
        }
        let Some(mut text) = read_if_exists(&path).await? else {
            return Ok(HookResult::Continue);
        };

        if let Some(stamped) = stamp_last_updated(&text, context.today()) {
            write_text(&path, &stamped).await?;
            debug!(path = raw, "Refreshed memory timestamp");
            text = stamped;
        }

        let budget = ArtifactKind::from_path(&path).budget(&context.settings);
        let warnings = review(&path, &text, budget);
        if warnings.is_empty() {
            return Ok(HookResult::Continue);
        }

        let body: Vec<String> = warnings.iter().map(|w| format!("- {w}")).collect();
        Ok(HookResult::InjectContext(format!(
            "Memory quality notes for {raw}:\n{}",
            body.join("\n")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{context, tool_event, write};
    use crate::hooks::EventType;

    async fn run(relative: &str, text: &str) -> (HookResult, String) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), relative, text);
        let (ctx, _) = context(dir.path());
        let event = tool_event(EventType::AfterTool, "Write", relative, dir.path());
        let result = MemoryQualityGate.handle(&event, &ctx).await.expect("handled");
        let on_disk = std::fs::read_to_string(path).unwrap_or_default();
        (result, on_disk)
    }

    fn context_text(result: &HookResult) -> &str {
        result.context().unwrap_or("")
    }

    #[tokio::test]
    async fn test_injects_timestamp_into_new_file() {
        let (result, on_disk) = run("memory/projects/t/notes.md", "# Notes\n\nUses axum 0.7.\n").await;
        assert_eq!(result, HookResult::Continue);
        assert!(on_disk.starts_with("<!-- Last Updated: 2025-06-01 -->\n# Notes"));
    }

    #[tokio::test]
    async fn test_refreshes_old_timestamp() {
        let (_, on_disk) = run(
            "memory/projects/t/notes.md",
            "<!-- Last Updated: 2020-01-01 -->\n# Notes\n",
        )
        .await;
        assert!(on_disk.contains("2025-06-01"));
        assert!(!on_disk.contains("2020-01-01"));
    }

    #[tokio::test]
    async fn test_warns_over_kind_budget() {
        let mut text = String::from("# Overview\n");
        for i in 0..210 {
            text.push_str(&format!("- fact {i}\n"));
        }
        let (result, _) = run("memory/projects/t/project_overview.md", &text).await;
        let ctx = context_text(&result);
        assert!(ctx.contains("200-line limit"));
    }

    #[tokio::test]
    async fn test_general_file_under_limit_is_quiet() {
        let mut text = String::from("# Patterns\n");
        for i in 0..300 {
            text.push_str(&format!("- pattern {i}\n"));
        }
        let (result, _) = run("memory/projects/t/codebase_patterns.md", &text).await;
        assert_eq!(result, HookResult::Continue);
    }

    #[tokio::test]
    async fn test_warns_on_vague_phrasing() {
        let text = "# Overview\nThe project uses custom patterns.\nIt has some interesting architecture.\n\
                    Has various integrations with services.\nUses custom middleware for things.\n";
        let (result, _) = run("memory/projects/t/overview.md", text).await;
        assert!(context_text(&result).contains("vague"));
    }

    #[tokio::test]
    async fn test_warns_on_absolute_paths() {
        let text = "# Notes\nConfig lives in /Users/alice/project/config.yaml\n";
        let (result, _) = run("memory/projects/t/notes.md", text).await;
        assert!(context_text(&result).contains("/Users/alice"));
    }

    #[tokio::test]
    async fn test_ignores_operational_and_non_memory_files() {
        let (result, on_disk) = run("memory/index.md", "# Index\n").await;
        assert_eq!(result, HookResult::Continue);
        assert_eq!(on_disk, "# Index\n");

        let (result, on_disk) = run("claudedocs/analysis-x.md", "# A\n").await;
        assert_eq!(result, HookResult::Continue);
        assert_eq!(on_disk, "# A\n");
    }
}
