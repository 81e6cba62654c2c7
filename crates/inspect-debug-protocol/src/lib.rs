//! # inspect-debug-protocol
//!
//! Remote-inspection protocol plumbing for the inspect-debug engine.
//!
//! This crate provides:
//! - WebSocket transport with request/response correlation and event channels
//! - Wire message codec
//! - Typed inspector client (execution control, breakpoints, runtime, profiling)
//! - Source map decoding and location mapping
//! - Target launching with output capture
//! - An in-process mock inspector (`test-support` feature)
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on inspect-debug-core
//! and is the only crate that speaks the wire protocol.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod inspector;
pub mod launch;
pub mod message;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;
pub mod sourcemap;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use inspector::{
    guard_condition, BreakpointPlacement, CpuProfile, HeapSnapshot, InspectorClient,
    InspectorEvent, PausedEvent,
};
pub use launch::{LaunchSpec, LaunchedTarget, Launcher, NodeLauncher, ProcessOutput, TargetProcess};
pub use message::{EventMessage, IncomingMessage};
pub use sourcemap::{SourceMap, SourceMapRegistry};
pub use transport::{Connection, TransportConfig};
