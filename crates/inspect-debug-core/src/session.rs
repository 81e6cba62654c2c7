//! Session types for debug session management.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, SourceLocation};

/// Unique identifier for a debug session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse a session ID from its string form.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| Error::InvalidInput(format!("Invalid session ID format: {s}")))
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a debug session.
///
/// ```text
/// Initializing → Running ⇄ Paused → Terminating → Terminated
/// ```
///
/// Any non-terminal state may move to `Terminating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Connecting to the target
    Initializing,
    /// Target is executing
    Running,
    /// Target is stopped at a location
    Paused,
    /// Session is shutting down
    Terminating,
    /// Session is gone; only `stop` is accepted (as a no-op)
    Terminated,
}

impl SessionState {
    /// Whether the session has fully terminated.
    pub fn is_terminated(self) -> bool {
        self == SessionState::Terminated
    }

    /// Whether the session is shutting down or gone.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Terminating | SessionState::Terminated)
    }

    /// Whether moving from `self` to `next` follows a lifecycle edge.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Initializing, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Initializing | Running | Paused, Terminating)
                | (Terminating, Terminated)
        )
    }

    /// Lowercase name used in messages.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Initializing => "initializing",
            SessionState::Running => "running",
            SessionState::Paused => "paused",
            SessionState::Terminating => "terminating",
            SessionState::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations a caller can issue against a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionOperation {
    /// Resume execution
    Continue,
    /// Step over the current statement
    StepOver,
    /// Step into the current call
    StepInto,
    /// Step out of the current function
    StepOut,
    /// Interrupt a running target
    Pause,
    /// Evaluate an expression in a paused frame
    Evaluate,
    /// Read the current call stack
    GetCallStack,
    /// List scopes or variables of a paused frame
    GetVariables,
    /// Add a breakpoint
    SetBreakpoint,
    /// Remove a breakpoint
    RemoveBreakpoint,
    /// Enable or disable a breakpoint
    ToggleBreakpoint,
    /// List breakpoints
    ListBreakpoints,
    /// Start or stop CPU profiling, or capture a heap snapshot
    Profile,
    /// Terminate the session
    Stop,
}

impl SessionOperation {
    /// Verb used in messages.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionOperation::Continue => "continue",
            SessionOperation::StepOver => "step over",
            SessionOperation::StepInto => "step into",
            SessionOperation::StepOut => "step out",
            SessionOperation::Pause => "pause",
            SessionOperation::Evaluate => "evaluate",
            SessionOperation::GetCallStack => "get call stack",
            SessionOperation::GetVariables => "get variables",
            SessionOperation::SetBreakpoint => "set breakpoint",
            SessionOperation::RemoveBreakpoint => "remove breakpoint",
            SessionOperation::ToggleBreakpoint => "toggle breakpoint",
            SessionOperation::ListBreakpoints => "list breakpoints",
            SessionOperation::Profile => "profile",
            SessionOperation::Stop => "stop",
        }
    }

    /// Whether the operation is accepted in `state`.
    pub fn is_valid_in(self, state: SessionState) -> bool {
        use SessionOperation::*;
        match self {
            Continue | StepOver | StepInto | StepOut | Evaluate | GetCallStack | GetVariables => {
                state == SessionState::Paused
            }
            Pause => state == SessionState::Running,
            SetBreakpoint | RemoveBreakpoint | ToggleBreakpoint | ListBreakpoints | Profile => {
                !state.is_terminal()
            }
            Stop => true,
        }
    }

    /// State the session moves to once the operation has been accepted, if it
    /// changes state at all.
    ///
    /// Steps land in `Running`; the following pause event moves the session back
    /// to `Paused`.
    pub fn resulting_state(self) -> Option<SessionState> {
        use SessionOperation::*;
        match self {
            Continue | StepOver | StepInto | StepOut => Some(SessionState::Running),
            Pause => Some(SessionState::Paused),
            Stop => Some(SessionState::Terminating),
            _ => None,
        }
    }

    /// Fail with [`Error::InvalidState`] unless the operation is accepted in `state`.
    pub fn check(self, state: SessionState) -> Result<()> {
        if self.is_valid_in(state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation: self,
                state,
            })
        }
    }
}

impl std::fmt::Display for SessionOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a session for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SessionInfo {
    /// Session identifier
    pub id: SessionId,
    /// Human-readable name
    pub name: String,
    /// Current state
    pub state: SessionState,
    /// Endpoint the session is connected to
    pub endpoint: String,
    /// Current pause location, if paused
    pub location: Option<SourceLocation>,
    /// Number of breakpoints owned by the session
    pub breakpoint_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_creation() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_session_id_parse_roundtrip() {
        let id = SessionId::new();
        let parsed = SessionId::parse(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
        assert!(SessionId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_lifecycle_edges() {
        use SessionState::*;
        assert!(Initializing.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Paused.can_transition_to(Terminating));
        assert!(Terminating.can_transition_to(Terminated));

        assert!(!Running.can_transition_to(Running));
        assert!(!Initializing.can_transition_to(Paused));
        assert!(!Terminated.can_transition_to(Running));
        assert!(!Terminated.can_transition_to(Terminating));
        assert!(!Running.can_transition_to(Terminated));
    }

    #[test]
    fn test_execution_control_requires_paused() {
        for op in [
            SessionOperation::Continue,
            SessionOperation::StepOver,
            SessionOperation::StepInto,
            SessionOperation::StepOut,
            SessionOperation::Evaluate,
            SessionOperation::GetCallStack,
        ] {
            assert!(op.check(SessionState::Paused).is_ok());
            assert!(matches!(
                op.check(SessionState::Running),
                Err(Error::InvalidState { .. })
            ));
        }
    }

    #[test]
    fn test_pause_requires_running() {
        assert!(SessionOperation::Pause.check(SessionState::Running).is_ok());
        assert!(SessionOperation::Pause.check(SessionState::Paused).is_err());
        assert!(SessionOperation::Pause
            .check(SessionState::Initializing)
            .is_err());
    }

    #[test]
    fn test_breakpoints_valid_in_non_terminal_states() {
        for state in [
            SessionState::Initializing,
            SessionState::Running,
            SessionState::Paused,
        ] {
            assert!(SessionOperation::SetBreakpoint.check(state).is_ok());
            assert!(SessionOperation::ListBreakpoints.check(state).is_ok());
        }
        assert!(SessionOperation::SetBreakpoint
            .check(SessionState::Terminated)
            .is_err());
    }

    #[test]
    fn test_stop_always_valid() {
        assert!(SessionOperation::Stop
            .check(SessionState::Terminated)
            .is_ok());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&SessionState::Paused).unwrap();
        assert_eq!(json, "\"paused\"");
    }
}
