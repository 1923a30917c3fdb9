//! Dispatcher - runs one dispatch cycle per event
//!
//! Every matching handler runs on its own task under its own timeout. The
//! cycle waits for all of them (or the cycle deadline), then arbitrates.
//! Handler faults never reach the caller: they are logged and recorded in
//! the health buffer so a later cycle can surface them.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::arbitration::{arbitrate, merge_context};
use super::registry::HookRegistry;
use super::types::{Event, EventType, HookContext, HookError, HookResult, ResolvedOutcome};
use crate::buffer::HealthBuffer;
use crate::config::EngineSettings;
use crate::telemetry::TelemetryLog;

/// Serializes dispatch cycles and resolves each one to an outcome
pub struct Dispatcher {
    registry: Arc<HookRegistry>,
    buffer: Arc<dyn HealthBuffer>,
    settings: Arc<EngineSettings>,
    telemetry: Arc<TelemetryLog>,
    cycle_lock: Mutex<()>,
}

impl Dispatcher {
    /// Create a dispatcher over a finished registry.
    #[must_use]
    pub fn new(
        registry: HookRegistry,
        buffer: Arc<dyn HealthBuffer>,
        settings: Arc<EngineSettings>,
        telemetry: Arc<TelemetryLog>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            buffer,
            settings,
            telemetry,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Shared health buffer.
    #[must_use]
    pub fn buffer(&self) -> &Arc<dyn HealthBuffer> {
        &self.buffer
    }

    /// Registered handlers.
    #[must_use]
    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }

    /// Parse one JSON event line and dispatch it.
    ///
    /// Malformed input is dropped with a warning and yields `None`, the same
    /// as an outcome with nothing to print.
    pub async fn dispatch_line(&self, line: &str) -> Option<String> {
        match Event::from_json(line) {
            Ok(event) => self.dispatch(event).await.render(),
            Err(err) => {
                warn!(error = %err, "Dropping malformed event");
                None
            }
        }
    }

    /// Run every matching handler for `event` and resolve the outcome.
    pub async fn dispatch(&self, event: Event) -> ResolvedOutcome {
        let _cycle = self.cycle_lock.lock().await;

        let span = info_span!(
            "dispatch",
            cycle_id = %Uuid::new_v4(),
            event = %event.event_type,
            tool = event.tool_name.as_deref().unwrap_or(""),
            session_id = %event.session_id,
        );
        self.run_cycle(event).instrument(span).await
    }

    async fn run_cycle(&self, event: Event) -> ResolvedOutcome {
        let event_type = event.event_type;
        let matching = self.registry.matching(&event);
        if matching.is_empty() {
            debug!("No hooks registered for event");
            return ResolvedOutcome::neutral(event_type);
        }

        let event = Arc::new(event);
        let context = HookContext::new(
            Arc::clone(&self.buffer),
            Arc::clone(&self.settings),
            Arc::clone(&self.telemetry),
            Utc::now(),
        );

        let handles: Vec<_> = matching
            .iter()
            .map(|registration| {
                let hook = Arc::clone(&registration.hook);
                let timeout = registration.timeout;
                let event = Arc::clone(&event);
                let context = context.clone();
                let span = tracing::Span::current();
                let handle = tokio::spawn(
                    async move {
                        match tokio::time::timeout(timeout, hook.handle(&event, &context)).await {
                            Ok(result) => result,
                            Err(_elapsed) => Err(HookError::TimedOut(timeout)),
                        }
                    }
                    .instrument(span),
                );
                (registration.hook.name(), handle)
            })
            .collect();

        let deadline = Instant::now() + self.settings.dispatch_deadline();
        let mut results = Vec::with_capacity(handles.len());
        for (name, mut handle) in handles {
            let outcome = match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) if join_err.is_panic() => Err(HookError::Panicked),
                Ok(Err(join_err)) => Err(HookError::Failed(join_err.to_string())),
                Err(_elapsed) => {
                    handle.abort();
                    Err(HookError::Aborted)
                }
            };

            match outcome {
                Ok(result) => {
                    debug!(hook = name, result = ?result, "Hook finished");
                    results.push(result);
                }
                Err(err) => self.record_fault(name, event_type, &err),
            }
        }

        resolve(event_type, &results)
    }

    fn record_fault(&self, hook: &str, event_type: EventType, err: &HookError) {
        warn!(hook, event = %event_type, error = %err, "Hook failed (fail-open)");
        self.buffer
            .append(&format!("Hook fault: {hook} on {event_type}: {err}"));
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Fold handler results (in registration order) into one outcome.
#[must_use]
pub fn resolve(event_type: EventType, results: &[HookResult]) -> ResolvedOutcome {
    if event_type.is_gating() {
        let decision = arbitrate(results.iter().filter_map(HookResult::decision));
        if decision.permission != super::types::Permission::Allow {
            info!(
                permission = decision.permission.as_str(),
                reason = decision.reason.as_deref().unwrap_or(""),
                "Cycle resolved to a blocking decision"
            );
        }
        return ResolvedOutcome::Decision {
            event_type,
            decision,
        };
    }

    let merged = merge_context(results.iter().filter_map(HookResult::context));
    if event_type == EventType::SessionStart {
        ResolvedOutcome::Summary(merged.unwrap_or_default())
    } else {
        ResolvedOutcome::Observation {
            additional_context: merged,
        }
    }
}
