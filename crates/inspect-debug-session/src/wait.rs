//! Wait conditions for session state changes.

use std::time::{Duration, Instant};

use inspect_debug_core::{millis, SessionState};

use crate::session::{DebugSession, SessionSnapshot};

/// What a [`WaitCondition`] waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    /// The session is paused
    Pause,
    /// The session is in the given state
    State(SessionState),
    /// The session has terminated
    Termination,
    /// The session left `Running` (paused or terminated)
    Stop,
}

/// Condition to wait for in session state.
#[derive(Debug, Clone)]
pub struct WaitCondition {
    /// What to wait for
    pub target: WaitTarget,

    /// Maximum time to wait
    pub timeout: Duration,
}

impl Default for WaitCondition {
    fn default() -> Self {
        Self {
            target: WaitTarget::Stop,
            timeout: Duration::from_secs(30),
        }
    }
}

impl WaitCondition {
    /// Create a new wait condition with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the session to pause.
    pub fn for_pause() -> Self {
        Self {
            target: WaitTarget::Pause,
            ..Self::default()
        }
    }

    /// Wait for a specific state.
    pub fn for_state(state: SessionState) -> Self {
        Self {
            target: WaitTarget::State(state),
            ..Self::default()
        }
    }

    /// Wait for the session to terminate.
    pub fn for_termination() -> Self {
        Self {
            target: WaitTarget::Termination,
            ..Self::default()
        }
    }

    /// Wait for the session to pause or terminate.
    pub fn for_stop() -> Self {
        Self::default()
    }

    /// Set timeout duration.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether `snapshot` satisfies the condition.
    pub fn is_met(&self, snapshot: &SessionSnapshot) -> bool {
        match self.target {
            WaitTarget::Pause => snapshot.state == SessionState::Paused,
            WaitTarget::State(state) => snapshot.state == state,
            WaitTarget::Termination => snapshot.state.is_terminated(),
            WaitTarget::Stop => snapshot.is_stopped(),
        }
    }
}

/// Result of a wait operation.
#[derive(Debug, Clone)]
pub struct WaitResult {
    /// Whether the condition was met
    pub condition_met: bool,

    /// Time waited in milliseconds
    pub waited_ms: u64,

    /// Session snapshot when the condition was met (or at timeout)
    pub snapshot: SessionSnapshot,
}

impl DebugSession {
    /// Wait for a condition to be met.
    ///
    /// Returns as soon as the session snapshot satisfies `condition`, or with
    /// `condition_met: false` once the timeout elapses. A session that
    /// terminates can never pause, so waiting for a pause ends early in that
    /// case.
    ///
    /// # Example
    /// ```no_run
    /// # use inspect_debug_session::{DebugSession, SessionOptions, WaitCondition};
    /// # use std::time::Duration;
    /// # async fn run() -> inspect_debug_core::Result<()> {
    /// let session =
    ///     DebugSession::attach("app", "ws://127.0.0.1:9229/abc", SessionOptions::default()).await?;
    /// let result = session
    ///     .wait_for(&WaitCondition::for_pause().with_timeout(Duration::from_secs(5)))
    ///     .await;
    /// if result.condition_met {
    ///     println!("Paused at {:?}", result.snapshot.location);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn wait_for(&self, condition: &WaitCondition) -> WaitResult {
        let start = Instant::now();
        let snapshot = self
            .wait_until(
                |snap| condition.is_met(snap) || snap.state.is_terminated(),
                condition.timeout,
            )
            .await
            .unwrap_or_else(|| self.snapshot());

        WaitResult {
            condition_met: condition.is_met(&snapshot),
            waited_ms: millis(start.elapsed()),
            snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_in(state: SessionState) -> SessionSnapshot {
        SessionSnapshot::new(state)
    }

    #[test]
    fn test_wait_condition_defaults() {
        let condition = WaitCondition::new();
        assert_eq!(condition.target, WaitTarget::Stop);
        assert_eq!(condition.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_with_timeout() {
        let condition = WaitCondition::for_pause().with_timeout(Duration::from_millis(250));
        assert_eq!(condition.target, WaitTarget::Pause);
        assert_eq!(condition.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_is_met() {
        let paused = snapshot_in(SessionState::Paused);
        let running = snapshot_in(SessionState::Running);
        let terminated = snapshot_in(SessionState::Terminated);

        assert!(WaitCondition::for_pause().is_met(&paused));
        assert!(!WaitCondition::for_pause().is_met(&running));
        assert!(WaitCondition::for_state(SessionState::Running).is_met(&running));
        assert!(WaitCondition::for_termination().is_met(&terminated));
        assert!(!WaitCondition::for_termination().is_met(&paused));
        assert!(WaitCondition::for_stop().is_met(&terminated));
        assert!(WaitCondition::for_stop().is_met(&paused));
        assert!(!WaitCondition::for_stop().is_met(&running));
    }
}
