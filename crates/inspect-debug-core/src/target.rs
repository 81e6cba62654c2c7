//! Target tree and aggregated log types.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::SessionState;

/// Caller-chosen identifier of a debug target.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    /// Create a target id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TargetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One node of the target forest.
///
/// Children are referenced by id only; there are no back-pointers to the
/// parent object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TargetNode {
    /// Target id
    pub id: TargetId,
    /// Human-readable name
    pub name: String,
    /// Parent target, if any
    pub parent_id: Option<TargetId>,
    /// Child targets in registration order
    pub children: Vec<TargetId>,
    /// Current session state
    pub state: SessionState,
}

/// Source stream of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Standard output of the target
    Stdout,
    /// Standard error of the target
    Stderr,
    /// Session lifecycle and debugger messages
    Debug,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogLevel::Stdout => "stdout",
            LogLevel::Stderr => "stderr",
            LogLevel::Debug => "debug",
        })
    }
}

/// One line of the aggregated multi-target log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LogEntry {
    /// Position in the log's insertion order
    pub sequence: u64,
    /// Time the entry was appended
    pub timestamp: DateTime<Utc>,
    /// Target that produced the entry
    pub target_id: TargetId,
    /// Target name at the time of the entry
    pub target_name: String,
    /// Stream
    pub level: LogLevel,
    /// Message text
    pub message: String,
}
