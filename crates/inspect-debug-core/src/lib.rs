//! # inspect-debug-core
//!
//! Core types for the inspect-debug session engine.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other inspect-debug crates. It provides:
//!
//! - Session types (SessionId, SessionState, SessionOperation)
//! - Source locations, breakpoints and global breakpoints
//! - Call frame, scope and variable views
//! - Target tree and aggregated log types
//! - Hang detection results
//! - Error types and YAML configuration
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other inspect-debug crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod breakpoint;
pub mod config;
pub mod error;
pub mod frame;
pub mod hang;
pub mod location;
pub mod session;
pub mod target;

// Re-export commonly used types
pub use breakpoint::{Breakpoint, BreakpointId, GlobalBreakpoint, GlobalBreakpointId};
pub use config::{
    millis, CoordinatorSettings, DebugConfig, HangDetectionSettings, LaunchSettings, SessionSettings,
    TransportSettings,
};
pub use error::{Error, Result};
pub use frame::{CallFrame, EvaluationResult, PauseReason, Scope, ScopeKind, Variable};
pub use hang::{HangDetectionResult, HangVerdict};
pub use location::SourceLocation;
pub use session::{SessionId, SessionInfo, SessionOperation, SessionState};
pub use target::{LogEntry, LogLevel, TargetId, TargetNode};
