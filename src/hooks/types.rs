//! Hook Types - events, results, and context for the hook system
//!
//! Defines the data structures that flow through one dispatch cycle: the
//! ingested [`Event`], what a handler returns ([`HookResult`]), and what the
//! cycle resolves to ([`ResolvedOutcome`]).

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::buffer::HealthBuffer;
use crate::config::EngineSettings;
use crate::freshness::FreshnessPolicy;
use crate::telemetry::{TelemetryError, TelemetryLog};

/// Lifecycle points of the external tool pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A session begins
    SessionStart,
    /// A session ends
    SessionEnd,
    /// The user submitted a prompt
    PromptSubmitted,
    /// A tool call is about to run
    BeforeTool,
    /// A tool call finished
    AfterTool,
    /// A tool call failed
    AfterToolFailure,
    /// The pipeline asks whether to grant a permission
    PermissionRequest,
    /// A notification was shown
    Notification,
    /// A subagent was started
    SubagentStart,
    /// A subagent stopped
    SubagentStop,
    /// The agent is about to stop
    Stop,
    /// A task was marked complete
    TaskCompleted,
    /// Context is about to be compacted
    PreCompact,
    /// A teammate agent went idle
    TeammateIdle,
}

impl EventType {
    /// Every event type, in lifecycle order.
    pub const ALL: [Self; 14] = [
        Self::SessionStart,
        Self::SessionEnd,
        Self::PromptSubmitted,
        Self::BeforeTool,
        Self::AfterTool,
        Self::AfterToolFailure,
        Self::PermissionRequest,
        Self::Notification,
        Self::SubagentStart,
        Self::SubagentStop,
        Self::Stop,
        Self::TaskCompleted,
        Self::PreCompact,
        Self::TeammateIdle,
    ];

    /// Kebab-case name used in manifests and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SessionStart => "session-start",
            Self::SessionEnd => "session-end",
            Self::PromptSubmitted => "prompt-submitted",
            Self::BeforeTool => "before-tool",
            Self::AfterTool => "after-tool",
            Self::AfterToolFailure => "after-tool-failure",
            Self::PermissionRequest => "permission-request",
            Self::Notification => "notification",
            Self::SubagentStart => "subagent-start",
            Self::SubagentStop => "subagent-stop",
            Self::Stop => "stop",
            Self::TaskCompleted => "task-completed",
            Self::PreCompact => "pre-compact",
            Self::TeammateIdle => "teammate-idle",
        }
    }

    /// Name used by the agent on the wire.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::SessionStart => "SessionStart",
            Self::SessionEnd => "SessionEnd",
            Self::PromptSubmitted => "UserPromptSubmit",
            Self::BeforeTool => "PreToolUse",
            Self::AfterTool => "PostToolUse",
            Self::AfterToolFailure => "PostToolUseFailure",
            Self::PermissionRequest => "PermissionRequest",
            Self::Notification => "Notification",
            Self::SubagentStart => "SubagentStart",
            Self::SubagentStop => "SubagentStop",
            Self::Stop => "Stop",
            Self::TaskCompleted => "TaskCompleted",
            Self::PreCompact => "PreCompact",
            Self::TeammateIdle => "TeammateIdle",
        }
    }

    /// Whether handlers of this event gate the action with a decision.
    #[must_use]
    pub const fn is_gating(self) -> bool {
        matches!(self, Self::BeforeTool | Self::PermissionRequest)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s || t.wire_name() == s)
            .ok_or_else(|| EventError::UnknownEvent(s.to_string()))
    }
}

/// Malformed event input
#[derive(Debug, Error)]
pub enum EventError {
    /// The line is not a JSON object of the expected shape
    #[error("invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A required field is absent or empty
    #[error("event is missing required field `{0}`")]
    MissingField(&'static str),
    /// The event name is not one we know
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
}

/// Event payload, one variant per event family
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Tool call events
    Tool {
        /// Tool arguments
        input: Map<String, Value>,
        /// Tool result, after the call
        response: Option<Value>,
        /// Failure text, for failed calls
        error: Option<String>,
    },
    /// A submitted prompt
    Prompt {
        /// Prompt text
        prompt: String,
    },
    /// Session boundaries
    Session {
        /// What started the session (startup, resume, ...)
        source: Option<String>,
        /// Why the session ended
        reason: Option<String>,
        /// Session transcript
        transcript_path: Option<PathBuf>,
    },
    /// Stop events
    Stop {
        /// Set when the stop was itself triggered by a stop hook
        stop_hook_active: bool,
        /// Session transcript
        transcript_path: Option<PathBuf>,
    },
    /// Pre-compaction
    Compact {
        /// manual or auto
        trigger: Option<String>,
        /// Session transcript
        transcript_path: Option<PathBuf>,
    },
    /// Anything without a dedicated variant
    Generic(Map<String, Value>),
}

/// One lifecycle event. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Lifecycle point
    pub event_type: EventType,
    /// Tool name, for tool events
    pub tool_name: Option<String>,
    /// Typed payload
    pub payload: EventPayload,
    /// Session identifier
    pub session_id: String,
    /// Working directory of the session
    pub working_dir: PathBuf,
    /// When the event happened
    pub timestamp: DateTime<Utc>,
    /// Fields we do not model, kept as-is
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    hook_event_name: Option<String>,
    tool_name: Option<String>,
    tool_input: Option<Map<String, Value>>,
    tool_response: Option<Value>,
    error: Option<String>,
    prompt: Option<String>,
    session_id: Option<String>,
    cwd: Option<String>,
    transcript_path: Option<String>,
    stop_hook_active: Option<bool>,
    trigger: Option<String>,
    source: Option<String>,
    reason: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Event {
    /// Build an event by hand.
    #[must_use]
    pub fn new(
        event_type: EventType,
        payload: EventPayload,
        session_id: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            event_type,
            tool_name: None,
            payload,
            session_id: session_id.into(),
            working_dir: working_dir.into(),
            timestamp: Utc::now(),
            extra: Map::new(),
        }
    }

    /// Attach a tool name.
    #[must_use]
    pub fn with_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    /// Parse one JSON event line.
    ///
    /// # Errors
    ///
    /// Returns [`EventError`] when the JSON is malformed, a required field is
    /// missing, or the event name is unknown.
    pub fn from_json(line: &str) -> Result<Self, EventError> {
        let raw: RawEvent = serde_json::from_str(line)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawEvent) -> Result<Self, EventError> {
        let name = non_empty(raw.hook_event_name).ok_or(EventError::MissingField("hook_event_name"))?;
        let session_id = non_empty(raw.session_id).ok_or(EventError::MissingField("session_id"))?;
        let cwd = non_empty(raw.cwd).ok_or(EventError::MissingField("cwd"))?;
        let event_type: EventType = name.parse()?;

        let transcript_path = non_empty(raw.transcript_path).map(PathBuf::from);
        let mut extra = raw.extra;

        let payload = match event_type {
            EventType::BeforeTool
            | EventType::AfterTool
            | EventType::AfterToolFailure
            | EventType::PermissionRequest => EventPayload::Tool {
                input: raw.tool_input.unwrap_or_default(),
                response: raw.tool_response,
                error: raw.error,
            },
            EventType::PromptSubmitted => EventPayload::Prompt {
                prompt: raw.prompt.unwrap_or_default(),
            },
            EventType::SessionStart | EventType::SessionEnd => EventPayload::Session {
                source: raw.source,
                reason: raw.reason,
                transcript_path,
            },
            EventType::Stop | EventType::SubagentStop => EventPayload::Stop {
                stop_hook_active: raw.stop_hook_active.unwrap_or(false),
                transcript_path,
            },
            EventType::PreCompact => EventPayload::Compact {
                trigger: raw.trigger,
                transcript_path,
            },
            EventType::Notification
            | EventType::SubagentStart
            | EventType::TaskCompleted
            | EventType::TeammateIdle => {
                // Generic events keep every field we did not consume.
                let mut map = std::mem::take(&mut extra);
                let known = [
                    ("prompt", raw.prompt.map(Value::String)),
                    ("source", raw.source.map(Value::String)),
                    ("reason", raw.reason.map(Value::String)),
                    ("trigger", raw.trigger.map(Value::String)),
                    ("error", raw.error.map(Value::String)),
                    (
                        "transcript_path",
                        transcript_path.map(|p| Value::String(p.display().to_string())),
                    ),
                ];
                for (key, value) in known {
                    if let Some(value) = value {
                        map.insert(key.to_string(), value);
                    }
                }
                EventPayload::Generic(map)
            }
        };

        Ok(Self {
            event_type,
            tool_name: non_empty(raw.tool_name),
            payload,
            session_id,
            working_dir: PathBuf::from(cwd),
            timestamp: raw.timestamp.unwrap_or_else(Utc::now),
            extra,
        })
    }

    /// Target file path of a file tool call, if any.
    #[must_use]
    pub fn file_path(&self) -> Option<&str> {
        let EventPayload::Tool { input, .. } = &self.payload else {
            return None;
        };
        ["file_path", "path", "notebook_path"]
            .iter()
            .find_map(|key| input.get(*key).and_then(Value::as_str))
            .filter(|p| !p.trim().is_empty())
    }

    /// Transcript path carried by session, stop and compact payloads.
    #[must_use]
    pub fn transcript_path(&self) -> Option<&Path> {
        match &self.payload {
            EventPayload::Session {
                transcript_path, ..
            }
            | EventPayload::Stop {
                transcript_path, ..
            }
            | EventPayload::Compact {
                transcript_path, ..
            } => transcript_path.as_deref(),
            _ => None,
        }
    }
}

/// Gate outcome, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Permission {
    /// Let the action proceed
    #[default]
    Allow,
    /// Ask the user
    Ask,
    /// Refuse the action
    Deny,
}

impl Permission {
    /// Wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Ask => "ask",
            Self::Deny => "deny",
        }
    }
}

/// A permission with an optional human-readable reason
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Decision {
    /// Outcome
    pub permission: Permission,
    /// Why, shown to the caller
    pub reason: Option<String>,
}

impl Decision {
    /// Plain allow.
    #[must_use]
    pub const fn allow() -> Self {
        Self {
            permission: Permission::Allow,
            reason: None,
        }
    }

    /// Deny with a reason.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            permission: Permission::Deny,
            reason: Some(reason.into()),
        }
    }

    /// Ask with a reason.
    #[must_use]
    pub fn ask(reason: impl Into<String>) -> Self {
        Self {
            permission: Permission::Ask,
            reason: Some(reason.into()),
        }
    }
}

/// Result of executing a hook
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HookResult {
    /// Nothing to report
    #[default]
    Continue,

    /// Advisory context for the agent
    InjectContext(String),

    /// Explicitly allow, optionally explaining why
    Allow {
        /// Reason surfaced to the caller
        reason: Option<String>,
    },

    /// Defer the decision to the user
    Ask {
        /// Reason surfaced to the caller
        reason: String,
    },

    /// Block the action (gating events only)
    Block {
        /// Reason for blocking
        reason: String,
    },
}

impl HookResult {
    /// Decision carried by this result, if any.
    #[must_use]
    pub fn decision(&self) -> Option<Decision> {
        match self {
            Self::Continue | Self::InjectContext(_) => None,
            Self::Allow { reason } => Some(Decision {
                permission: Permission::Allow,
                reason: reason.clone(),
            }),
            Self::Ask { reason } => Some(Decision::ask(reason.clone())),
            Self::Block { reason } => Some(Decision::deny(reason.clone())),
        }
    }

    /// Advisory context carried by this result, if any.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::InjectContext(text) => Some(text),
            _ => None,
        }
    }
}

/// Handler faults. The dispatcher recovers from all of them.
#[derive(Debug, Error)]
pub enum HookError {
    /// Filesystem access failed
    #[error("I/O on {path} failed: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// Telemetry log write failed
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The handler ran past its own timeout
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    /// The handler panicked
    #[error("panicked")]
    Panicked,
    /// The cycle deadline cut the handler off
    #[error("aborted at the cycle deadline")]
    Aborted,
    /// Any other failure
    #[error("{0}")]
    Failed(String),
}

impl HookError {
    /// Wrap an I/O error with its path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Services and clock shared with every handler of one cycle
#[derive(Clone)]
pub struct HookContext {
    /// Shared health buffer
    pub buffer: Arc<dyn HealthBuffer>,
    /// Engine settings
    pub settings: Arc<EngineSettings>,
    /// Telemetry log writer
    pub telemetry: Arc<TelemetryLog>,
    /// Cycle clock, fixed for the whole cycle
    pub now: DateTime<Utc>,
}

impl HookContext {
    /// Create a context for one cycle.
    #[must_use]
    pub fn new(
        buffer: Arc<dyn HealthBuffer>,
        settings: Arc<EngineSettings>,
        telemetry: Arc<TelemetryLog>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            buffer,
            settings,
            telemetry,
            now,
        }
    }

    /// Calendar date of the cycle clock.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// Freshness buckets from settings.
    #[must_use]
    pub fn freshness_policy(&self) -> FreshnessPolicy {
        FreshnessPolicy {
            fresh_days: self.settings.fresh_days,
            aging_days: self.settings.stale_days,
        }
    }
}

impl fmt::Debug for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("buffered", &self.buffer.len())
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

/// What one dispatch cycle resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedOutcome {
    /// Gating events
    Decision {
        /// Event the decision answers
        event_type: EventType,
        /// Arbitrated decision
        decision: Decision,
    },
    /// Advisory events
    Observation {
        /// Merged context, if any handler offered some
        additional_context: Option<String>,
    },
    /// Session start: plain text shown to the agent
    Summary(String),
}

impl ResolvedOutcome {
    /// Neutral outcome for an event type (allow / no context / empty text).
    #[must_use]
    pub fn neutral(event_type: EventType) -> Self {
        if event_type.is_gating() {
            Self::Decision {
                event_type,
                decision: Decision::allow(),
            }
        } else if event_type == EventType::SessionStart {
            Self::Summary(String::new())
        } else {
            Self::Observation {
                additional_context: None,
            }
        }
    }

    /// Permission of a gating outcome; advisory outcomes always allow.
    #[must_use]
    pub fn permission(&self) -> Permission {
        match self {
            Self::Decision { decision, .. } => decision.permission,
            _ => Permission::Allow,
        }
    }

    /// Render what the agent reads on stdout. `None` means print nothing.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        match self {
            Self::Decision {
                decision:
                    Decision {
                        permission: Permission::Allow,
                        reason: None,
                    },
                ..
            } => None,
            Self::Decision {
                event_type,
                decision,
            } => {
                let mut output = Map::new();
                output.insert("hookEventName".into(), json!(event_type.wire_name()));
                output.insert(
                    "permissionDecision".into(),
                    json!(decision.permission.as_str()),
                );
                if let Some(reason) = &decision.reason {
                    output.insert("permissionDecisionReason".into(), json!(reason));
                }
                Some(json!({ "hookSpecificOutput": output }).to_string())
            }
            Self::Observation { additional_context } => Some(match additional_context {
                Some(text) => json!({ "additionalContext": text }).to_string(),
                None => "{}".to_string(),
            }),
            Self::Summary(text) if text.is_empty() => None,
            Self::Summary(text) => Some(text.clone()),
        }
    }
}
