//! System health emitter
//!
//! Drains the health buffer after each tool call and shows what piled up.

use async_trait::async_trait;

use crate::hooks::{Event, Hook, HookContext, HookError, HookResult};

/// Flushes buffered warnings into a health report
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHealthEmitter;

#[async_trait]
impl Hook for SystemHealthEmitter {
    fn name(&self) -> &'static str {
        "system_health_emitter"
    }

    async fn handle(&self, _event: &Event, context: &HookContext) -> Result<HookResult, HookError> {
        let entries = context.buffer.flush();
        if entries.is_empty() {
            return Ok(HookResult::Continue);
        }

        let mut report = format!("Health Report ({} event(s)):", entries.len());
        for entry in &entries {
            report.push_str("\n- ");
            report.push_str(&entry.to_string());
        }
        Ok(HookResult::InjectContext(report))
    }
}
