//! Read gate over memory files
//!
//! Fresh memory reads pass silently, aging memory passes with a buffered
//! warning, and stale or undated memory is denied.

use async_trait::async_trait;
use tracing::debug;

use super::read_if_exists;
use crate::freshness::{Freshness, FreshnessRecord};
use crate::hooks::{Event, Hook, HookContext, HookError, HookResult};
use crate::paths;

/// Denies reads of stale memory
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryFreshnessEnforcer;

#[async_trait]
impl Hook for MemoryFreshnessEnforcer {
    fn name(&self) -> &'static str {
        "memory_freshness_enforcer"
    }

    async fn handle(&self, event: &Event, context: &HookContext) -> Result<HookResult, HookError> {
        let Some(raw) = event.file_path() else {
            return Ok(HookResult::Continue);
        };
        let path = paths::resolve(&event.working_dir, raw);
        if !paths::is_knowledge_memory(&path) {
            return Ok(HookResult::Continue);
        }

        // Nothing on disk yet means nothing to gate.
        let Some(text) = read_if_exists(&path).await? else {
            return Ok(HookResult::Continue);
        };

        let today = context.today();
        let record = FreshnessRecord::from_text(raw, &text, today);
        let freshness = record.freshness(&context.freshness_policy(), today);
        debug!(path = raw, freshness = %freshness, age_days = record.age_days, "Memory freshness");

        Ok(match (freshness, record.updated_at) {
            (Freshness::Fresh, _) => HookResult::Continue,
            (Freshness::Aging, _) => {
                context.buffer.append(&format!(
                    "Memory aging: {raw} was last updated {} days ago; consider refreshing it",
                    record.age_days
                ));
                HookResult::Continue
            }
            (Freshness::Stale, None) => HookResult::Block {
                reason: format!(
                    "Memory file {raw} has no Last Updated timestamp (missing `<!-- Last Updated: YYYY-MM-DD -->` first line). \
                     Verify its content and add a timestamp, or archive it."
                ),
            },
            (Freshness::Stale, Some(updated_at)) => HookResult::Block {
                reason: format!(
                    "Memory file {raw} is stale: last updated {updated_at} ({} days old, limit {}). \
                     Refresh it against the current codebase or archive it before relying on it.",
                    record.age_days, context.settings.stale_days
                ),
            },
        })
    }
}
