//! Session telemetry logger
//!
//! On stop, counts what the session did and appends it to the telemetry
//! log under the state directory.

use async_trait::async_trait;

use super::read_if_exists;
use crate::hooks::{Event, EventPayload, Hook, HookContext, HookError, HookResult};
use crate::telemetry::aggregate;

/// Writes one telemetry entry per stopped session
#[derive(Debug, Default, Clone, Copy)]
pub struct ForgeTelemetry;

#[async_trait]
impl Hook for ForgeTelemetry {
    fn name(&self) -> &'static str {
        "forge_telemetry"
    }

    async fn handle(&self, event: &Event, context: &HookContext) -> Result<HookResult, HookError> {
        // A stop triggered by a stop hook would log the session twice.
        if matches!(
            event.payload,
            EventPayload::Stop {
                stop_hook_active: true,
                ..
            }
        ) {
            return Ok(HookResult::Continue);
        }

        let Some(transcript_path) = event.transcript_path() else {
            return Ok(HookResult::Continue);
        };
        let Some(transcript) = read_if_exists(transcript_path).await? else {
            return Ok(HookResult::Continue);
        };

        let entry = aggregate(&transcript, &event.session_id, context.now);
        context.telemetry.append(&entry).await?;
        context.buffer.append(&entry.summary());
        Ok(HookResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::HealthBuffer;
    use crate::handlers::test_support::{context, write};
    use crate::hooks::EventType;
    use std::path::{Path, PathBuf};

    fn stop(root: &Path, transcript: Option<PathBuf>, active: bool) -> Event {
        Event::new(
            EventType::Stop,
            EventPayload::Stop {
                stop_hook_active: active,
                transcript_path: transcript,
            },
            "my-test-session",
            root,
        )
    }

    #[tokio::test]
    async fn test_logs_entry_and_buffers_summary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let transcript = write(
            dir.path(),
            "transcript.txt",
            "\"tool_name\" \"Read\"\n\"tool_name\" \"Write\"\nRead skills/analyze/SKILL.md\n/analyze x\n",
        );
        let (ctx, buffer) = context(dir.path());

        let result = ForgeTelemetry
            .handle(&stop(dir.path(), Some(transcript), false), &ctx)
            .await
            .expect("handled");
        assert_eq!(result, HookResult::Continue);

        let log = std::fs::read_to_string(ctx.telemetry.path()).unwrap_or_default();
        for field in ["timestamp:", "my-test-session", "tools: 2", "skills: 1", "memory: 0", "context: 0", "commands: 1"] {
            assert!(log.contains(field), "missing {field} in {log}");
        }

        let notices = buffer.flush();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.starts_with("Telemetry"));
    }

    #[tokio::test]
    async fn test_skips_when_stop_hook_active() {
        let dir = tempfile::tempdir().expect("tempdir");
        let transcript = write(dir.path(), "transcript.txt", "some content\n");
        let (ctx, buffer) = context(dir.path());

        ForgeTelemetry
            .handle(&stop(dir.path(), Some(transcript), true), &ctx)
            .await
            .expect("handled");
        assert!(!ctx.telemetry.path().exists());
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_missing_transcript_is_silent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (ctx, _) = context(dir.path());
        for transcript in [None, Some(PathBuf::from("/nonexistent/file.txt"))] {
            let result = ForgeTelemetry
                .handle(&stop(dir.path(), transcript, false), &ctx)
                .await
                .expect("handled");
            assert_eq!(result, HookResult::Continue);
        }
        assert!(!ctx.telemetry.path().exists());
    }
}
