//! Handler manifest
//!
//! A versioned YAML (or JSON) document binding handlers to events:
//!
//! ```yaml
//! version: 1
//! hooks:
//!   - event: before-tool
//!     matcher: Read
//!     handler: memory_freshness_enforcer
//!     timeout_ms: 3000
//! ```
//!
//! The manifest is read once at startup. Any defect in it is fatal.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use super::registry::{HandlerRegistration, Hook, HookRegistry, Matcher};
use super::types::EventType;

/// Manifest format version this build understands
pub const MANIFEST_VERSION: u32 = 1;

/// Default manifest compiled into the binary
pub const BUILTIN_MANIFEST: &str = include_str!("../../config/hooks.yaml");

/// Manifest defects
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be read
    #[error("failed to read manifest {path}: {source}")]
    Read {
        /// Manifest path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// The document does not have the manifest shape
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// Unsupported `version`
    #[error("unsupported manifest version {found} (expected {})", MANIFEST_VERSION)]
    Version {
        /// Version found in the document
        found: u32,
    },
    /// `event` is not a known event name
    #[error("hooks[{index}]: unknown event `{event}`")]
    UnknownEvent {
        /// Entry index
        index: usize,
        /// Offending name
        event: String,
    },
    /// `handler` does not name a known handler
    #[error("hooks[{index}]: unknown handler `{handler}`")]
    UnknownHandler {
        /// Entry index
        index: usize,
        /// Offending reference
        handler: String,
    },
    /// `matcher` is not a valid regular expression
    #[error("hooks[{index}]: invalid matcher `{pattern}`: {source}")]
    BadMatcher {
        /// Entry index
        index: usize,
        /// Offending pattern
        pattern: String,
        /// Regex error
        #[source]
        source: regex::Error,
    },
}

/// One `hooks` entry
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    /// Event name, kebab-case or wire spelling
    pub event: String,
    /// Tool-name pattern; absent, empty or `*` is unconditional
    #[serde(default)]
    pub matcher: Option<String>,
    /// Handler reference
    pub handler: String,
    /// Per-invocation timeout override
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Report order, lower first
    #[serde(default)]
    pub priority: Option<i32>,
}

/// Parsed manifest document
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Format version
    pub version: u32,
    /// Handler bindings
    #[serde(default)]
    pub hooks: Vec<ManifestEntry>,
}

impl Manifest {
    /// Parse a manifest document. YAML is a superset of JSON, so both work.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Parse`] or [`ManifestError::Version`].
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_yaml::from_str(text)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ManifestError::Version {
                found: manifest.version,
            });
        }
        Ok(manifest)
    }

    /// Read and parse a manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Read`] when the file cannot be read, or any
    /// error from [`Manifest::parse`].
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// The manifest shipped with the binary.
    ///
    /// # Errors
    ///
    /// Only fails if the bundled document is broken.
    pub fn builtin() -> Result<Self, ManifestError> {
        Self::parse(BUILTIN_MANIFEST)
    }

    /// Resolve every entry against `catalog` into a registry.
    ///
    /// # Errors
    ///
    /// Returns the first unknown event, unknown handler or invalid matcher.
    pub fn build_registry(
        &self,
        catalog: &HandlerCatalog,
        default_timeout: Duration,
    ) -> Result<HookRegistry, ManifestError> {
        let mut registry = HookRegistry::new();

        for (index, entry) in self.hooks.iter().enumerate() {
            let event: EventType =
                entry
                    .event
                    .parse()
                    .map_err(|_| ManifestError::UnknownEvent {
                        index,
                        event: entry.event.clone(),
                    })?;

            let hook = catalog
                .get(&entry.handler)
                .ok_or_else(|| ManifestError::UnknownHandler {
                    index,
                    handler: entry.handler.clone(),
                })?;

            let pattern = entry.matcher.as_deref().unwrap_or("");
            let matcher = Matcher::parse(pattern).map_err(|source| ManifestError::BadMatcher {
                index,
                pattern: pattern.to_string(),
                source,
            })?;

            let timeout = entry
                .timeout_ms
                .map_or(default_timeout, Duration::from_millis);

            registry.register(
                HandlerRegistration::new(event, hook, timeout)
                    .with_matcher(matcher)
                    .with_priority(entry.priority.unwrap_or(0)),
            );
        }

        info!(hooks = registry.len(), "Manifest loaded");
        Ok(registry)
    }
}

/// Handlers a manifest may reference, keyed by [`Hook::name`]
#[derive(Default)]
pub struct HandlerCatalog {
    handlers: HashMap<&'static str, Arc<dyn Hook>>,
}

impl HandlerCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler under its own name.
    pub fn insert(&mut self, hook: Arc<dyn Hook>) {
        self.handlers.insert(hook.name(), hook);
    }

    /// Builder-style [`HandlerCatalog::insert`].
    #[must_use]
    pub fn with(mut self, hook: Arc<dyn Hook>) -> Self {
        self.insert(hook);
        self
    }

    /// Look a handler up by reference.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Hook>> {
        self.handlers.get(name).cloned()
    }

    /// Known handler names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for HandlerCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerCatalog")
            .field("handlers", &self.names())
            .finish()
    }
}
