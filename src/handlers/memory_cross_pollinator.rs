//! Memory cross-pollinator
//!
//! When a skill memory file (`memory/skills/<skill>/<project>/...`) is
//! written, copies its critical, security, breaking-change and performance
//! sections into the project's `cross_skill_insights.md` so every other
//! skill sees them.

use async_trait::async_trait;
use lazy_regex::lazy_regex;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use super::{read_if_exists, write_text};
use crate::freshness::stamp_last_updated;
use crate::hooks::{Event, Hook, HookContext, HookError, HookResult};
use crate::paths::{self, MEMORY_DIR};

/// File in `memory/projects/<project>/` collecting propagated findings
pub const INSIGHTS_FILE: &str = "cross_skill_insights.md";

/// Heading words that mark a section worth sharing
const CRITICAL_TOPICS: &[&str] = &["critical", "security", "breaking", "performance"];

/// Propagates critical skill findings to project memory
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryCrossPollinator;

/// Where a skill memory file sits in the memory tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillMemory {
    /// The `memory/` directory itself
    pub memory_root: PathBuf,
    /// Skill that wrote the file
    pub skill: String,
    /// Project the file is about
    pub project: String,
    /// Path below the project directory
    pub file: String,
}

impl SkillMemory {
    /// Locate `path` as `memory/skills/<skill>/<project>/<file...>`.
    #[must_use]
    pub fn locate(path: &Path) -> Option<Self> {
        if !paths::is_knowledge_memory(path) {
            return None;
        }
        let components: Vec<Component<'_>> = path.components().collect();
        let memory_at = components.iter().rposition(|c| {
            matches!(c, Component::Normal(part) if *part == MEMORY_DIR)
        })?;
        let rest: Vec<String> = components[memory_at + 1..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let [skills, skill, project, file @ ..] = rest.as_slice() else {
            return None;
        };
        if skills != "skills" || file.is_empty() {
            return None;
        }
        Some(Self {
            memory_root: components[..=memory_at].iter().collect(),
            skill: skill.clone(),
            project: project.clone(),
            file: file.join("/"),
        })
    }

    /// The project's insights file.
    #[must_use]
    pub fn insights_path(&self) -> PathBuf {
        self.memory_root
            .join("projects")
            .join(&self.project)
            .join(INSIGHTS_FILE)
    }
}

/// A section worth propagating
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Heading text without the `#` marks
    pub heading: String,
    /// Section body, blank edges trimmed
    pub body: String,
}

/// Sections whose heading starts with a critical topic. A section runs
/// until the next heading of the same or a higher level.
#[must_use]
pub fn critical_sections(text: &str) -> Vec<Section> {
    static RE_HEADING: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"^(#{1,6})\s+(.+?)\s*$");

    let lines: Vec<&str> = text.lines().collect();
    let mut sections = Vec::new();
    for (at, line) in lines.iter().enumerate() {
        let Some(captures) = RE_HEADING.captures(line) else {
            continue;
        };
        let (Some(marks), Some(heading)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        let level = marks.as_str().len();
        let first_word = heading
            .as_str()
            .split(|c: char| !c.is_alphanumeric())
            .next()
            .unwrap_or("")
            .to_lowercase();
        if level < 2 || !CRITICAL_TOPICS.contains(&first_word.as_str()) {
            continue;
        }

        let body: Vec<&str> = lines[at + 1..]
            .iter()
            .copied()
            .take_while(|next| {
                !matches!(
                    RE_HEADING.captures(next).and_then(|c| c.get(1)),
                    Some(m) if m.as_str().len() <= level
                )
            })
            .collect();
        let body = body.join("\n").trim().to_string();
        if !body.is_empty() {
            sections.push(Section {
                heading: heading.as_str().to_string(),
                body,
            });
        }
    }
    sections
}

/// Split an insights file into its preamble and `## ` blocks.
fn split_blocks(text: &str) -> (String, Vec<(String, String)>) {
    let mut preamble = String::new();
    let mut blocks: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        if line.starts_with("## ") {
            blocks.push((line.to_string(), String::new()));
        }
        let target = blocks.last_mut().map_or(&mut preamble, |(_, body)| body);
        target.push_str(line);
        target.push('\n');
    }
    (preamble, blocks)
}

/// Insights text with one block per section from `source`; blocks already
/// propagated from the same source and heading are replaced in place.
#[must_use]
pub fn merge_insights(existing: &str, source: &SkillMemory, sections: &[Section]) -> String {
    let (preamble, mut blocks) = split_blocks(existing);
    for section in sections {
        let heading = format!("## {} (from {}/{})", section.heading, source.skill, source.file);
        let block = format!("{heading}\n\n{}\n", section.body);
        match blocks.iter_mut().find(|(h, _)| *h == heading) {
            Some((_, body)) => *body = block,
            None => blocks.push((heading, block)),
        }
    }

    let mut out = preamble.trim_end().to_string();
    out.push('\n');
    for (_, block) in &blocks {
        out.push('\n');
        out.push_str(block.trim_end());
        out.push('\n');
    }
    out
}

fn new_insights(project: &str) -> String {
    format!("# Cross-Skill Insights: {project}\n\nCritical findings propagated from skill memory.\n")
}

#[async_trait]
impl Hook for MemoryCrossPollinator {
    fn name(&self) -> &'static str {
        "memory_cross_pollinator"
    }

    async fn handle(&self, event: &Event, context: &HookContext) -> Result<HookResult, HookError> {
        let Some(raw) = event.file_path() else {
            return Ok(HookResult::Continue);
        };
        let path = paths::resolve(&event.working_dir, raw);
        let Some(source) = SkillMemory::locate(&path) else {
            return Ok(HookResult::Continue);
        };
        let Some(text) = read_if_exists(&path).await? else {
            return Ok(HookResult::Continue);
        };

        let sections = critical_sections(&text);
        if sections.is_empty() {
            debug!(path = raw, "No critical sections to propagate");
            return Ok(HookResult::Continue);
        }

        let insights = source.insights_path();
        let existing = read_if_exists(&insights)
            .await?
            .unwrap_or_else(|| new_insights(&source.project));
        let merged = merge_insights(&existing, &source, &sections);
        let merged = stamp_last_updated(&merged, context.today()).unwrap_or(merged);
        if merged == existing {
            return Ok(HookResult::Continue);
        }

        if let Some(parent) = insights.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| HookError::io(parent, err))?;
        }
        write_text(&insights, &merged).await?;

        let shown = insights
            .strip_prefix(&event.working_dir)
            .unwrap_or(&insights)
            .display()
            .to_string();
        debug!(path = %shown, sections = sections.len(), "Propagated critical findings");
        Ok(HookResult::InjectContext(format!(
            "Propagated {} critical finding(s) from {}/{} to {shown}",
            sections.len(),
            source.skill,
            source.file
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{context, tool_event, write};
    use crate::hooks::EventType;

    const INSIGHTS: &str = "forge-plugin/memory/projects/myproject/cross_skill_insights.md";

    async fn run(root: &Path, relative: &str) -> HookResult {
        let (ctx, _) = context(root);
        let event = tool_event(EventType::AfterTool, "Write", relative, root);
        MemoryCrossPollinator.handle(&event, &ctx).await.expect("handled")
    }

    #[test]
    fn test_locate_needs_skill_project_and_file() {
        let found = SkillMemory::locate(Path::new(
            "/repo/forge-plugin/memory/skills/analyze/myproject/findings.md",
        ));
        assert_eq!(
            found,
            Some(SkillMemory {
                memory_root: PathBuf::from("/repo/forge-plugin/memory"),
                skill: "analyze".into(),
                project: "myproject".into(),
                file: "findings.md".into(),
            })
        );
        for path in [
            "/repo/memory/skills/analyze.md",
            "/repo/memory/skills/analyze/findings.md",
            "/repo/memory/projects/test/overview.md",
            "/repo/context/python/frameworks.md",
            "/repo/src/main.py",
        ] {
            assert_eq!(SkillMemory::locate(Path::new(path)), None, "{path}");
        }
    }

    #[test]
    fn test_sections_end_at_same_or_higher_heading() {
        let text = "# Findings\n\n## Critical\n\nPool exhausted.\n### Detail\nUnder load.\n\
                    ## Architecture\nMVC.\n## Security Notes\nSQL injection.\n## Performance\n\n";
        let sections = critical_sections(text);
        assert_eq!(
            sections,
            vec![
                Section {
                    heading: "Critical".into(),
                    body: "Pool exhausted.\n### Detail\nUnder load.".into(),
                },
                Section {
                    heading: "Security Notes".into(),
                    body: "SQL injection.".into(),
                },
            ]
        );
        assert!(critical_sections("# Critical\nTop-level titles are not sections.\n").is_empty());
    }

    #[tokio::test]
    async fn test_critical_section_creates_insights_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "forge-plugin/memory/skills/analyze/myproject/findings.md",
            "<!-- Last Updated: 2025-01-01 -->\n# Analysis Findings\n\n## Critical\n\n\
             The database connection pool is exhausted under load.\n",
        );

        let result = run(dir.path(), "forge-plugin/memory/skills/analyze/myproject/findings.md").await;
        assert!(result
            .context()
            .unwrap_or("")
            .contains("Propagated 1 critical finding(s) from analyze/findings.md"));

        let insights = std::fs::read_to_string(dir.path().join(INSIGHTS)).unwrap_or_default();
        assert!(insights.starts_with("<!-- Last Updated: 2025-06-01 -->\n# Cross-Skill Insights: myproject"));
        assert!(insights.contains("## Critical (from analyze/findings.md)\n\nThe database connection pool"));
    }

    #[tokio::test]
    async fn test_rewriting_a_source_replaces_its_block() {
        let dir = tempfile::tempdir().expect("tempdir");
        let relative = "forge-plugin/memory/skills/improve/myproject/security.md";
        write(dir.path(), relative, "## Security\nSQL injection in handler.\n");
        run(dir.path(), relative).await;
        write(
            dir.path(),
            "forge-plugin/memory/skills/implement/myproject/changes.md",
            "## Breaking\nRemoved v1 endpoints.\n## Performance\nQuery went from 50ms to 2s.\n",
        );
        run(dir.path(), "forge-plugin/memory/skills/implement/myproject/changes.md").await;
        write(dir.path(), relative, "## Security\nSQL injection fixed; audit the rest.\n");
        run(dir.path(), relative).await;

        let insights = std::fs::read_to_string(dir.path().join(INSIGHTS)).unwrap_or_default();
        assert_eq!(insights.matches("## Security (from improve/security.md)").count(), 1);
        assert!(insights.contains("SQL injection fixed"));
        assert!(!insights.contains("SQL injection in handler"));
        assert!(insights.contains("## Breaking (from implement/changes.md)"));
        assert!(insights.contains("## Performance (from implement/changes.md)"));

        // Same content again leaves the file alone.
        assert_eq!(run(dir.path(), relative).await, HookResult::Continue);
    }

    #[tokio::test]
    async fn test_non_critical_or_non_skill_files_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "forge-plugin/memory/skills/analyze/myproject/notes.md",
            "## Architecture\nThe project uses a standard MVC pattern.\n",
        );
        write(dir.path(), "forge-plugin/memory/skills/analyze.md", "## Critical\nImportant!\n");

        for relative in [
            "forge-plugin/memory/skills/analyze/myproject/notes.md",
            "forge-plugin/memory/skills/analyze.md",
            "src/main.py",
        ] {
            assert_eq!(run(dir.path(), relative).await, HookResult::Continue, "{relative}");
        }
        assert!(!dir.path().join(INSIGHTS).exists());
    }
}
