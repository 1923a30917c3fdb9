//! Hook Registry - manages hook registrations
//!
//! Provides the `Hook` trait and `HookRegistry`, which maps an incoming
//! event to the registrations that should run for it.

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::types::{Event, EventType, HookContext, HookError, HookResult};

/// Trait for implementing hooks
#[async_trait]
pub trait Hook: Send + Sync {
    /// Name of the hook, also its manifest reference
    fn name(&self) -> &'static str;

    /// Handle an event and return the result
    ///
    /// Hooks should return `HookResult::Continue` when they have nothing to
    /// say. Errors are recovered by the dispatcher and never block.
    async fn handle(&self, event: &Event, context: &HookContext) -> Result<HookResult, HookError>;
}

/// Full-match tool-name pattern
#[derive(Debug, Clone)]
pub struct Matcher {
    source: String,
    regex: Regex,
}

impl Matcher {
    /// Compile `pattern` anchored at both ends.
    ///
    /// Returns `Ok(None)` for the unconditional patterns (`""` and `"*"`).
    ///
    /// # Errors
    ///
    /// Returns the regex error for an invalid pattern.
    pub fn parse(pattern: &str) -> Result<Option<Self>, regex::Error> {
        let pattern = pattern.trim();
        if pattern.is_empty() || pattern == "*" {
            return Ok(None);
        }
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Some(Self {
            source: pattern.to_string(),
            regex,
        }))
    }

    /// Pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the tool name matches the whole pattern.
    #[must_use]
    pub fn is_match(&self, tool_name: &str) -> bool {
        self.regex.is_match(tool_name)
    }
}

/// One handler bound to one event
#[derive(Clone)]
pub struct HandlerRegistration {
    /// Event the handler listens to
    pub event: EventType,
    /// Tool-name filter; `None` is unconditional
    pub matcher: Option<Matcher>,
    /// The handler
    pub hook: Arc<dyn Hook>,
    /// Lower runs (and reports) first
    pub priority: i32,
    /// Per-invocation timeout
    pub timeout: Duration,
}

impl HandlerRegistration {
    /// Registration with no matcher and default priority.
    #[must_use]
    pub fn new(event: EventType, hook: Arc<dyn Hook>, timeout: Duration) -> Self {
        Self {
            event,
            matcher: None,
            hook,
            priority: 0,
            timeout,
        }
    }

    /// Set the tool-name matcher.
    #[must_use]
    pub fn with_matcher(mut self, matcher: Option<Matcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Whether this registration applies to `event`.
    ///
    /// A pattern never matches an event that has no tool name.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if self.event != event.event_type {
            return false;
        }
        match (&self.matcher, event.tool_name.as_deref()) {
            (None, _) => true,
            (Some(matcher), Some(tool)) => matcher.is_match(tool),
            (Some(_), None) => false,
        }
    }
}

impl std::fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("event", &self.event)
            .field("matcher", &self.matcher.as_ref().map(Matcher::as_str))
            .field("hook", &self.hook.name())
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Registry of handler registrations, immutable once the dispatcher owns it
#[derive(Debug, Default)]
pub struct HookRegistry {
    registrations: Vec<HandlerRegistration>,
}

impl HookRegistry {
    /// Create a new empty hook registry
    #[must_use]
    pub const fn new() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    /// Register a handler
    ///
    /// Registrations are kept ordered by priority; equal priorities keep
    /// registration order.
    pub fn register(&mut self, registration: HandlerRegistration) {
        info!(
            hook = registration.hook.name(),
            event = %registration.event,
            matcher = registration.matcher.as_ref().map_or("*", Matcher::as_str),
            priority = registration.priority,
            "Registered hook"
        );
        self.registrations.push(registration);
        self.registrations.sort_by_key(|r| r.priority);
    }

    /// Registrations that apply to `event`, in report order
    #[must_use]
    pub fn matching(&self, event: &Event) -> Vec<&HandlerRegistration> {
        self.registrations
            .iter()
            .filter(|r| r.matches(event))
            .collect()
    }

    /// All registrations
    #[must_use]
    pub fn registrations(&self) -> &[HandlerRegistration] {
        &self.registrations
    }

    /// Check if any hooks are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Get the number of registered hooks
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }
}
