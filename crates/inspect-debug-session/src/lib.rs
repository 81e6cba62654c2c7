//! # inspect-debug-session
//!
//! Debug session lifecycle for the inspect-debug session engine.
//!
//! This crate provides:
//! - The per-target session state machine (attach, launch, stop)
//! - Execution control, stack and variable inspection
//! - Per-session breakpoint management with late verification
//! - Bounded output capture and state wait conditions
//! - A session registry addressed by session id
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on inspect-debug-core
//! and inspect-debug-protocol to drive one target per session.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod breakpoints;
pub mod manager;
pub mod output;
pub mod session;
pub mod wait;

// Re-export commonly used types
pub use breakpoints::{BreakpointHits, BreakpointManager};
pub use manager::{SessionManager, SessionManagerConfig};
pub use output::{OutputBuffer, OutputLine, OutputRead};
pub use session::{DebugSession, SessionEvent, SessionOptions, SessionSnapshot};
pub use wait::{WaitCondition, WaitResult, WaitTarget};
