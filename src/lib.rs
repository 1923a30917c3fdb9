//! Forge hook engine
//!
//! Receives lifecycle events from an orchestrating agent, fans them out to
//! the registered handlers and resolves the results into one outcome per
//! event. Handlers gate memory reads on freshness, score and prune memory
//! and generated documents, screen prompts for personal data and record
//! per-session telemetry.

#![deny(missing_docs)]
// lazy_regex! statics validate patterns at compile time
#![allow(clippy::non_std_lazy_statics)]

pub mod buffer;
pub mod config;
pub mod freshness;
pub mod handlers;
pub mod hooks;
pub mod paths;
pub mod pruning;
pub mod quality;
pub mod telemetry;
pub mod utils;
