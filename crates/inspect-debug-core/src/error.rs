//! Error types for the inspect-debug session engine.

use thiserror::Error;

use crate::{BreakpointId, GlobalBreakpointId, SessionId, SessionOperation, SessionState, TargetId};

/// Main error type for inspect-debug operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Cannot reach the target, or the connection to it was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation attempted on a closed connection
    #[error("Not connected to target")]
    NotConnected,

    /// Malformed or unexpected message from the target
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The target answered a request with an error object
    #[error("Remote error {code}: {message}")]
    Remote {
        /// Error code reported by the target
        code: i64,
        /// Error message reported by the target
        message: String,
    },

    /// No response arrived within the call's deadline
    #[error("Timeout waiting for '{method}' after {timeout_ms}ms")]
    Timeout {
        /// Protocol method or operation that timed out
        method: String,
        /// Deadline in milliseconds
        timeout_ms: u64,
    },

    /// Request was cancelled because its connection was closed
    #[error("Request cancelled: connection closed")]
    Cancelled,

    /// Operation is not valid in the session's current lifecycle state
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        /// Attempted operation
        operation: SessionOperation,
        /// State the session was in
        state: SessionState,
    },

    /// Target id already registered
    #[error("Duplicate target: {0}")]
    DuplicateTarget(TargetId),

    /// Target id not registered
    #[error("Target not found: {0}")]
    TargetNotFound(TargetId),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Session limit reached
    #[error("Session limit reached (max: {0})")]
    SessionLimitReached(usize),

    /// Breakpoint id unknown to the session
    #[error("Breakpoint not found: {0}")]
    BreakpointNotFound(BreakpointId),

    /// Global breakpoint id unknown to the coordinator
    #[error("Global breakpoint not found: {0}")]
    GlobalBreakpointNotFound(GlobalBreakpointId),

    /// Failed to launch a target process
    #[error("Launch error: {0}")]
    Launch(String),

    /// Source map could not be loaded or decoded
    #[error("Source map error: {0}")]
    SourceMap(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input or parameters (generic)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error means the target can no longer be reached.
    ///
    /// Connection loss is fatal to a session; callers move it to `Terminated`.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::NotConnected)
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
