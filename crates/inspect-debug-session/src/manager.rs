//! Session manager for coordinating multiple debug sessions.
//!
//! Exposes one method per session verb, each taking a [`SessionId`], so a
//! command-dispatch layer can route calls without holding session handles.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use inspect_debug_core::{
    Breakpoint, BreakpointId, CallFrame, DebugConfig, Error, EvaluationResult, Result, SessionId,
    SessionInfo, SessionState,
};
use inspect_debug_protocol::{LaunchSpec, Launcher, NodeLauncher};

use crate::session::{DebugSession, SessionOptions, SessionSnapshot};

/// Configuration for session manager.
#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    /// Maximum number of concurrent sessions
    pub max_sessions: usize,

    /// Options applied to every new session
    pub session: SessionOptions,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self::from(&DebugConfig::default())
    }
}

impl From<&DebugConfig> for SessionManagerConfig {
    fn from(config: &DebugConfig) -> Self {
        Self {
            max_sessions: config.session.max_sessions,
            session: SessionOptions::from_config(config),
        }
    }
}

/// Session manager for coordinating multiple debug sessions.
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<DebugSession>>>>,
    /// Ids of sessions that were closed or pruned after terminating
    closed: RwLock<HashSet<SessionId>>,
    config: SessionManagerConfig,
    launcher: Arc<dyn Launcher>,
}

impl SessionManager {
    /// Create a new session manager with default configuration.
    pub fn new() -> Self {
        Self::from_config(&DebugConfig::default())
    }

    /// Create a session manager from a loaded configuration.
    pub fn from_config(config: &DebugConfig) -> Self {
        Self::with_launcher(
            SessionManagerConfig::from(config),
            Arc::new(NodeLauncher::new(config.launch.clone())),
        )
    }

    /// Create a session manager that starts targets with `launcher`.
    pub fn with_launcher(config: SessionManagerConfig, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            closed: RwLock::new(HashSet::new()),
            config,
            launcher,
        }
    }

    /// Drop sessions that terminated on their own so they stop counting
    /// against the session limit.
    fn prune_terminated(&self, sessions: &mut HashMap<SessionId, Arc<DebugSession>>) {
        let terminated: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, session)| session.state() == SessionState::Terminated)
            .map(|(id, _)| *id)
            .collect();
        if terminated.is_empty() {
            return;
        }

        let mut closed = self.closed.write();
        for session_id in terminated {
            sessions.remove(&session_id);
            closed.insert(session_id);
            debug!("Pruned terminated session {}", session_id);
        }
    }

    fn check_capacity(&self) -> Result<()> {
        let mut sessions = self.sessions.write();
        self.prune_terminated(&mut sessions);
        if sessions.len() >= self.config.max_sessions {
            return Err(Error::SessionLimitReached(self.config.max_sessions));
        }
        Ok(())
    }

    async fn register(&self, session: DebugSession) -> Result<Arc<DebugSession>> {
        let session = Arc::new(session);
        let rejected = {
            let mut sessions = self.sessions.write();
            self.prune_terminated(&mut sessions);
            if sessions.len() >= self.config.max_sessions {
                true
            } else {
                sessions.insert(session.id(), Arc::clone(&session));
                false
            }
        };

        if rejected {
            session.stop().await?;
            return Err(Error::SessionLimitReached(self.config.max_sessions));
        }
        info!("Registered session {} ({})", session.id(), session.name());
        Ok(session)
    }

    /// Launch a target and start a session for it.
    pub async fn start(
        &self,
        name: impl Into<String>,
        spec: &LaunchSpec,
    ) -> Result<Arc<DebugSession>> {
        self.check_capacity()?;
        let session = DebugSession::launch(
            name,
            self.launcher.as_ref(),
            spec,
            self.config.session.clone(),
        )
        .await?;
        self.register(session).await
    }

    /// Start a session attached to a running inspector endpoint.
    pub async fn attach(
        &self,
        name: impl Into<String>,
        endpoint: &str,
    ) -> Result<Arc<DebugSession>> {
        self.check_capacity()?;
        let session = DebugSession::attach(name, endpoint, self.config.session.clone()).await?;
        self.register(session).await
    }

    /// Get a session by ID.
    pub fn get_session(&self, session_id: &SessionId) -> Result<Arc<DebugSession>> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or(Error::SessionNotFound(*session_id))
    }

    /// List all registered sessions.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .values()
            .map(|session| session.info())
            .collect()
    }

    /// Stop a session and remove it from the registry.
    pub async fn close_session(&self, session_id: &SessionId) -> Result<()> {
        let session = self.get_session(session_id)?;
        session.stop().await?;
        self.sessions.write().remove(session_id);
        self.closed.write().insert(*session_id);
        Ok(())
    }

    /// Close all sessions.
    pub async fn close_all(&self) {
        let session_ids: Vec<SessionId> = self.sessions.read().keys().copied().collect();
        for session_id in session_ids {
            if let Err(e) = self.close_session(&session_id).await {
                warn!("Failed to close session {}: {}", session_id, e);
            }
        }
    }

    /// Get the number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    // Session verbs

    /// Set a breakpoint in a session.
    pub async fn set_breakpoint(
        &self,
        session_id: &SessionId,
        file: &str,
        line: u32,
        condition: Option<String>,
    ) -> Result<Breakpoint> {
        self.get_session(session_id)?
            .set_breakpoint(file, line, condition)
            .await
    }

    /// Remove a breakpoint from a session.
    pub async fn remove_breakpoint(
        &self,
        session_id: &SessionId,
        breakpoint_id: BreakpointId,
    ) -> Result<()> {
        self.get_session(session_id)?
            .remove_breakpoint(breakpoint_id)
            .await
    }

    /// List the breakpoints of a session.
    pub fn list_breakpoints(&self, session_id: &SessionId) -> Result<Vec<Breakpoint>> {
        self.get_session(session_id)?.list_breakpoints()
    }

    /// Resume a paused session.
    pub async fn continue_(&self, session_id: &SessionId) -> Result<SessionSnapshot> {
        self.get_session(session_id)?.continue_().await
    }

    /// Step over in a paused session.
    pub async fn step_over(&self, session_id: &SessionId) -> Result<SessionSnapshot> {
        self.get_session(session_id)?.step_over().await
    }

    /// Step into in a paused session.
    pub async fn step_into(&self, session_id: &SessionId) -> Result<SessionSnapshot> {
        self.get_session(session_id)?.step_into().await
    }

    /// Step out in a paused session.
    pub async fn step_out(&self, session_id: &SessionId) -> Result<SessionSnapshot> {
        self.get_session(session_id)?.step_out().await
    }

    /// Pause a running session.
    pub async fn pause(&self, session_id: &SessionId) -> Result<SessionSnapshot> {
        self.get_session(session_id)?.pause().await
    }

    /// Evaluate an expression in a paused session.
    pub async fn evaluate(
        &self,
        session_id: &SessionId,
        expression: &str,
        frame_index: usize,
    ) -> Result<EvaluationResult> {
        self.get_session(session_id)?
            .evaluate(expression, frame_index)
            .await
    }

    /// Call stack of a paused session.
    pub fn get_call_stack(&self, session_id: &SessionId) -> Result<Vec<CallFrame>> {
        self.get_session(session_id)?.get_call_stack()
    }

    /// Stop a session; an unknown id is an error, a terminated one is not.
    pub async fn stop(&self, session_id: &SessionId) -> Result<()> {
        match self.close_session(session_id).await {
            Err(Error::SessionNotFound(_)) if self.closed.read().contains(session_id) => Ok(()),
            result => result,
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
