//! Hooks Module
//!
//! The dispatch machinery: event types, the handler registry, the manifest
//! that fills it, and the dispatcher that runs one cycle per event.

pub mod arbitration;
pub mod dispatcher;
pub mod manifest;
pub mod registry;
pub mod types;

pub use dispatcher::Dispatcher;
pub use manifest::{HandlerCatalog, Manifest, ManifestError};
pub use registry::{HandlerRegistration, Hook, HookRegistry, Matcher};
pub use types::{
    Decision, Event, EventError, EventPayload, EventType, HookContext, HookError, HookResult,
    Permission, ResolvedOutcome,
};
