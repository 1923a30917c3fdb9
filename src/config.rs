//! Configuration and settings management
//!
//! Loads engine settings from config files and environment variables and
//! defines the fixed policy constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Maximum number of entries held by the shared health buffer
pub const HEALTH_BUFFER_CAPACITY: usize = 200;
/// Per-handler timeout when the manifest does not name one
pub const DEFAULT_HOOK_TIMEOUT_MS: u64 = 5_000;
/// Deadline for a whole dispatch cycle
pub const DISPATCH_DEADLINE_MS: u64 = 10_000;

/// Upper bound (inclusive) of the `fresh` bucket, in days
pub const FRESH_MAX_DAYS: i64 = 30;
/// Upper bound (inclusive) of the `aging` bucket, in days
pub const AGING_MAX_DAYS: i64 = 90;

/// Lines at the top of an artifact that pruning never touches
pub const PRUNE_HEADER_LINES: usize = 5;
/// Line budget for ordinary memory artifacts
pub const PRUNE_DEFAULT_BUDGET: usize = 500;
/// Line budget for overview-style summaries
pub const PRUNE_OVERVIEW_BUDGET: usize = 200;
/// Line budget for history-style append logs
pub const PRUNE_HISTORY_BUDGET: usize = 300;

/// Maximum number of entries kept in the telemetry log
pub const TELEMETRY_MAX_ENTRIES: usize = 500;
/// Maximum number of lines kept in the telemetry log
pub const TELEMETRY_MAX_LINES: usize = 10_000;

/// Engine settings loaded from env/files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Directory for runtime state (telemetry log), relative to the working dir
    pub state_dir: PathBuf,
    /// Handler manifest to load instead of the built-in one
    pub manifest_path: Option<PathBuf>,

    /// Shared buffer capacity
    pub buffer_capacity: usize,
    /// Whole-cycle deadline in milliseconds
    pub dispatch_deadline_ms: u64,
    /// Per-handler timeout fallback in milliseconds
    pub default_hook_timeout_ms: u64,

    /// Last day (inclusive) classified as fresh
    pub fresh_days: i64,
    /// Last day (inclusive) classified as aging
    pub stale_days: i64,

    /// Header lines preserved by pruning
    pub prune_header_lines: usize,
    /// Default pruning budget
    pub prune_default_budget: usize,
    /// Pruning budget for overview artifacts
    pub prune_overview_budget: usize,
    /// Pruning budget for history artifacts
    pub prune_history_budget: usize,

    /// Telemetry log entry cap
    pub telemetry_max_entries: usize,
    /// Telemetry log line cap
    pub telemetry_max_lines: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".forge"),
            manifest_path: None,
            buffer_capacity: HEALTH_BUFFER_CAPACITY,
            dispatch_deadline_ms: DISPATCH_DEADLINE_MS,
            default_hook_timeout_ms: DEFAULT_HOOK_TIMEOUT_MS,
            fresh_days: FRESH_MAX_DAYS,
            stale_days: AGING_MAX_DAYS,
            prune_header_lines: PRUNE_HEADER_LINES,
            prune_default_budget: PRUNE_DEFAULT_BUDGET,
            prune_overview_budget: PRUNE_OVERVIEW_BUDGET,
            prune_history_budget: PRUNE_HISTORY_BUDGET,
            telemetry_max_entries: TELEMETRY_MAX_ENTRIES,
            telemetry_max_lines: TELEMETRY_MAX_LINES,
        }
    }
}

impl EngineSettings {
    /// Load engine settings from config files and environment variables.
    ///
    /// Priority: `FORGE_*` env vars → config files → defaults. A broken
    /// configuration never stops the engine; it logs and falls back to
    /// defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let builder = Self::with_defaults(Config::builder()).map(|b| {
            b.add_source(File::with_name("config/default").required(false))
                .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
                .add_source(File::with_name("config/local").required(false))
                .add_source(
                    Environment::with_prefix("FORGE")
                        .try_parsing(true)
                        .ignore_empty(true),
                )
        });

        let config = match builder {
            Ok(builder) => builder.build(),
            Err(err) => return Self::warn_and_default(err),
        };

        match config.and_then(Config::try_deserialize) {
            Ok(settings) => settings,
            Err(err) => Self::warn_and_default(err),
        }
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let defaults = Self::default();
        builder
            .set_default("state_dir", defaults.state_dir.display().to_string())?
            .set_default("buffer_capacity", defaults.buffer_capacity as u64)?
            .set_default("dispatch_deadline_ms", defaults.dispatch_deadline_ms)?
            .set_default("default_hook_timeout_ms", defaults.default_hook_timeout_ms)?
            .set_default("fresh_days", defaults.fresh_days)?
            .set_default("stale_days", defaults.stale_days)?
            .set_default("prune_header_lines", defaults.prune_header_lines as u64)?
            .set_default("prune_default_budget", defaults.prune_default_budget as u64)?
            .set_default("prune_overview_budget", defaults.prune_overview_budget as u64)?
            .set_default("prune_history_budget", defaults.prune_history_budget as u64)?
            .set_default("telemetry_max_entries", defaults.telemetry_max_entries as u64)?
            .set_default("telemetry_max_lines", defaults.telemetry_max_lines as u64)
    }

    fn warn_and_default(err: ConfigError) -> Self {
        warn!(error = %err, "Failed to load engine settings, using defaults");
        Self::default()
    }

    /// Whole-cycle deadline.
    #[must_use]
    pub const fn dispatch_deadline(&self) -> Duration {
        Duration::from_millis(self.dispatch_deadline_ms)
    }

    /// Per-handler timeout fallback.
    #[must_use]
    pub const fn default_hook_timeout(&self) -> Duration {
        Duration::from_millis(self.default_hook_timeout_ms)
    }
}
