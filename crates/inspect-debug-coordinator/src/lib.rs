//! # inspect-debug-coordinator
//!
//! Multi-target coordination for the inspect-debug session engine.
//!
//! This crate provides:
//! - A target forest keyed by id, with children referenced by id only
//! - Global breakpoints fanned out to several targets
//! - Concurrent continue/pause/stop across all targets with per-target failures
//! - A bounded, insertion-ordered log aggregated from every target
//!
//! ## Architecture
//!
//! This is Layer 3 in the architecture - it depends on inspect-debug-core
//! and inspect-debug-session. Sessions are created by the caller and handed
//! to the coordinator, which never launches targets itself.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod event;
pub mod log;

// Re-export commonly used types
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use event::{CoordinatorEvent, FanOutOperation, FanOutReport, TargetFailure};
pub use log::{AggregatedLog, LogQuery};
