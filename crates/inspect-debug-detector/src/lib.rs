//! # inspect-debug-detector
//!
//! Hang detection for the inspect-debug session engine.
//!
//! This crate provides:
//! - A detector that launches a fresh target and samples its stack
//! - Stability tracking over consecutive samples
//! - Three-way classification: hung, completed, or timed out
//!
//! ## Architecture
//!
//! This is Layer 3 in the architecture - it depends on inspect-debug-core
//! and inspect-debug-protocol, and runs independently of any long-lived
//! debug session.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod detector;
pub mod sampler;

// Re-export commonly used types
pub use detector::{HangDetector, HangDetectorConfig};
pub use sampler::{StabilityTracker, StackSample};
