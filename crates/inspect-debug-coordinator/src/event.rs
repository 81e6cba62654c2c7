//! Coordinator events and fan-out reports.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use inspect_debug_core::{GlobalBreakpointId, LogEntry, TargetId};

/// Operation applied to every target at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FanOutOperation {
    /// Resume every target
    Continue,
    /// Pause every target
    Pause,
    /// Stop every target
    Stop,
}

impl std::fmt::Display for FanOutOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FanOutOperation::Continue => "continue",
            FanOutOperation::Pause => "pause",
            FanOutOperation::Stop => "stop",
        })
    }
}

/// One target's failure during a fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TargetFailure {
    /// Target that failed
    pub target_id: TargetId,
    /// Error message
    pub message: String,
}

/// Outcome of a fan-out across all targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FanOutReport {
    /// Operation that was applied
    pub operation: FanOutOperation,
    /// Targets where the operation succeeded
    pub succeeded: Vec<TargetId>,
    /// Targets where it failed
    pub failed: Vec<TargetFailure>,
}

impl FanOutReport {
    /// Whether no target failed.
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of targets the operation was issued to.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Events published by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    /// A target was registered
    TargetAdded {
        /// Target id
        target_id: TargetId,
        /// Parent target, if any
        parent_id: Option<TargetId>,
    },
    /// A target was removed
    TargetRemoved {
        /// Target id
        target_id: TargetId,
    },
    /// Installing a global breakpoint failed on one target
    BreakpointError {
        /// Global breakpoint being installed
        breakpoint: GlobalBreakpointId,
        /// Target that failed
        target_id: TargetId,
        /// Error message
        message: String,
    },
    /// A fan-out operation failed on one target
    TargetError {
        /// Operation that failed
        operation: FanOutOperation,
        /// Target that failed
        target_id: TargetId,
        /// Error message
        message: String,
    },
    /// An entry was appended to the aggregated log
    Log(LogEntry),
}
