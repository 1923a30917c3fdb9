//! Output quality scorer
//!
//! Scores generated documents after every write and records the result as
//! a trailing block on the document itself.

use async_trait::async_trait;
use tracing::info;

use super::{read_if_exists, write_text};
use crate::hooks::{Event, Hook, HookContext, HookError, HookResult};
use crate::paths;
use crate::quality::{apply_trailer, score_named};

/// Scores `claudedocs/` documents
#[derive(Debug, Default, Clone, Copy)]
pub struct OutputQualityScorer;

#[async_trait]
impl Hook for OutputQualityScorer {
    fn name(&self) -> &'static str {
        "output_quality_scorer"
    }

    async fn handle(&self, event: &Event, context: &HookContext) -> Result<HookResult, HookError> {
        let Some(raw) = event.file_path() else {
            return Ok(HookResult::Continue);
        };
        let path = paths::resolve(&event.working_dir, raw);
        if !paths::is_scored_document(&path) {
            return Ok(HookResult::Continue);
        }
        let Some(text) = read_if_exists(&path).await? else {
            return Ok(HookResult::Continue);
        };

        let file_name = path.file_name().and_then(|n| n.to_str());
        let report = score_named(file_name, &text);
        let updated = apply_trailer(&text, &report, context.today());
        if updated != text {
            write_text(&path, &updated).await?;
        }

        info!(
            path = raw,
            score = report.score,
            grade = %report.grade,
            "Scored output document"
        );

        let mut message = format!(
            "Output quality for {}: {}/{} (grade {})",
            file_name.unwrap_or(raw),
            report.score,
            report.max_score,
            report.grade
        );
        for line in &report.feedback {
            message.push_str("\n- ");
            message.push_str(line);
        }
        Ok(HookResult::InjectContext(message))
    }
}
