//! Breakpoint types.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{SourceLocation, TargetId};

/// Session-scoped breakpoint identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct BreakpointId(u32);

impl BreakpointId {
    /// Create a breakpoint id from its number.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// The numeric value.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A line breakpoint owned by one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Breakpoint {
    /// Session-scoped identifier
    pub id: BreakpointId,
    /// File the breakpoint was requested in
    pub file: String,
    /// Requested line (1-based)
    pub line: u32,
    /// Condition expression, evaluated by the target at hit time
    pub condition: Option<String>,
    /// Whether the target confirmed the breakpoint maps to loaded code
    pub verified: bool,
    /// Whether the breakpoint is currently installed
    pub enabled: bool,
    /// Where the target actually bound the breakpoint
    pub resolved_location: Option<SourceLocation>,
    /// Number of pauses reported for this breakpoint
    pub hit_count: u32,
}

/// Identifier of a breakpoint fanned out across several targets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct GlobalBreakpointId(u64);

impl GlobalBreakpointId {
    /// Create a global breakpoint id from its number.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for GlobalBreakpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gbp-{}", self.0)
    }
}

/// A logical breakpoint set on several targets at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GlobalBreakpoint {
    /// Identifier
    pub id: GlobalBreakpointId,
    /// File
    pub file: String,
    /// Line (1-based)
    pub line: u32,
    /// Optional condition
    pub condition: Option<String>,
    /// Local breakpoint id per target, only for targets where setting succeeded
    pub targets: BTreeMap<TargetId, BreakpointId>,
}

impl GlobalBreakpoint {
    /// Targets the breakpoint was installed on.
    pub fn target_ids(&self) -> Vec<TargetId> {
        self.targets.keys().cloned().collect()
    }
}
