//! Coordinator for groups of related debug targets.
//!
//! Targets live in an arena keyed by [`TargetId`]; parents and children refer
//! to each other by id only. Operations spanning several targets run
//! concurrently and settle independently: one target failing never prevents
//! the others from being attempted.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use inspect_debug_core::{
    DebugConfig, Error, GlobalBreakpoint, GlobalBreakpointId, LogEntry, LogLevel, Result,
    TargetId, TargetNode,
};
use inspect_debug_session::{DebugSession, SessionEvent};

use crate::event::{CoordinatorEvent, FanOutOperation, FanOutReport, TargetFailure};
use crate::log::{AggregatedLog, LogQuery};

/// How long a removed target's forwarder may take to drain its last events.
const FORWARDER_DRAIN: Duration = Duration::from_millis(500);

/// Configuration for a [`Coordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Maximum number of aggregated log entries
    pub max_log_entries: usize,
    /// Capacity of the coordinator event channel
    pub event_buffer: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&DebugConfig::default())
    }
}

impl From<&DebugConfig> for CoordinatorConfig {
    fn from(config: &DebugConfig) -> Self {
        Self {
            max_log_entries: config.coordinator.max_log_entries,
            event_buffer: config.session.event_buffer,
        }
    }
}

struct Target {
    name: String,
    parent_id: Option<TargetId>,
    children: Vec<TargetId>,
    session: Arc<DebugSession>,
    forwarder: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Arena {
    targets: HashMap<TargetId, Target>,
    roots: Vec<TargetId>,
}

impl Arena {
    /// `root` and its descendants, children before parents.
    fn post_order(&self, root: &TargetId) -> Vec<TargetId> {
        let mut order = Vec::new();
        let mut stack = vec![(root.clone(), false)];

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            if let Some(target) = self.targets.get(&id) {
                stack.push((id, true));
                for child in target.children.iter().rev() {
                    stack.push((child.clone(), false));
                }
            }
        }
        order
    }

    /// Every target, parents before children, roots in registration order.
    fn pre_order(&self) -> Vec<(&TargetId, &Target)> {
        let mut nodes = Vec::with_capacity(self.targets.len());
        let mut stack: Vec<&TargetId> = self.roots.iter().rev().collect();

        while let Some(id) = stack.pop() {
            if let Some(target) = self.targets.get(id) {
                nodes.push((id, target));
                stack.extend(target.children.iter().rev());
            }
        }
        nodes
    }

    fn unlink(&mut self, id: &TargetId) {
        let parent = self.targets.get(id).and_then(|t| t.parent_id.clone());
        match parent {
            Some(parent) => {
                if let Some(parent) = self.targets.get_mut(&parent) {
                    parent.children.retain(|child| child != id);
                }
            }
            None => self.roots.retain(|root| root != id),
        }
    }
}

/// State shared with the per-target log forwarders.
struct Shared {
    log: Mutex<AggregatedLog>,
    events: broadcast::Sender<CoordinatorEvent>,
}

impl Shared {
    fn append(&self, target_id: &TargetId, target_name: &str, level: LogLevel, message: String) {
        let mut log = self.log.lock();
        let entry = log.append(target_id, target_name, level, message);
        // Sent under the lock so subscribers see entries in sequence order.
        let _ = self.events.send(CoordinatorEvent::Log(entry));
    }

    fn emit(&self, event: CoordinatorEvent) {
        let _ = self.events.send(event);
    }
}

/// Coordinates a forest of debug targets.
pub struct Coordinator {
    arena: RwLock<Arena>,
    global_breakpoints: Mutex<BTreeMap<GlobalBreakpointId, GlobalBreakpoint>>,
    next_global_id: AtomicU64,
    shared: Arc<Shared>,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Create a coordinator with default configuration.
    pub fn new() -> Self {
        Self::with_config(CoordinatorConfig::default())
    }

    /// Create a coordinator with custom configuration.
    pub fn with_config(config: CoordinatorConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            arena: RwLock::new(Arena::default()),
            global_breakpoints: Mutex::new(BTreeMap::new()),
            next_global_id: AtomicU64::new(1),
            shared: Arc::new(Shared {
                log: Mutex::new(AggregatedLog::new(config.max_log_entries)),
                events,
            }),
            config,
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Subscribe to coordinator events.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.shared.events.subscribe()
    }

    // Target tree

    /// Register a target, optionally as the child of `parent_id`.
    ///
    /// The session's output and lifecycle events are forwarded into the
    /// aggregated log from here on. Must be called within a Tokio runtime.
    pub fn add_target(
        &self,
        id: impl Into<TargetId>,
        name: impl Into<String>,
        session: Arc<DebugSession>,
        parent_id: Option<TargetId>,
    ) -> Result<()> {
        let id = id.into();
        let name = name.into();

        {
            let mut arena = self.arena.write();
            if arena.targets.contains_key(&id) {
                return Err(Error::DuplicateTarget(id));
            }
            match &parent_id {
                Some(parent) => arena
                    .targets
                    .get_mut(parent)
                    .ok_or_else(|| Error::TargetNotFound(parent.clone()))?
                    .children
                    .push(id.clone()),
                None => arena.roots.push(id.clone()),
            }

            let forwarder = (!session.state().is_terminal()).then(|| {
                tokio::spawn(forward_session_events(
                    self.shared.clone(),
                    id.clone(),
                    name.clone(),
                    session.subscribe(),
                ))
            });

            arena.targets.insert(
                id.clone(),
                Target {
                    name: name.clone(),
                    parent_id: parent_id.clone(),
                    children: Vec::new(),
                    session: session.clone(),
                    forwarder,
                },
            );
        }

        info!("Added target {} ({})", id, name);
        self.shared.append(
            &id,
            &name,
            LogLevel::Debug,
            format!("Target added ({})", session.state()),
        );
        self.shared
            .emit(CoordinatorEvent::TargetAdded { target_id: id, parent_id });
        Ok(())
    }

    /// Remove a target and all its descendants, stopping their sessions.
    ///
    /// Returns the removed ids, descendants before ancestors.
    pub async fn remove_target(&self, id: &TargetId) -> Result<Vec<TargetId>> {
        let removed: Vec<(TargetId, Target)> = {
            let mut arena = self.arena.write();
            if !arena.targets.contains_key(id) {
                return Err(Error::TargetNotFound(id.clone()));
            }
            let order = arena.post_order(id);
            arena.unlink(id);
            order
                .into_iter()
                .filter_map(|tid| arena.targets.remove(&tid).map(|target| (tid, target)))
                .collect()
        };

        let mut ids = Vec::with_capacity(removed.len());
        for (tid, target) in removed {
            if let Err(e) = target.session.stop().await {
                warn!("Failed to stop target {}: {}", tid, e);
            }
            if let Some(mut forwarder) = target.forwarder {
                if tokio::time::timeout(FORWARDER_DRAIN, &mut forwarder)
                    .await
                    .is_err()
                {
                    forwarder.abort();
                }
            }
            self.forget_target_breakpoints(&tid);

            info!("Removed target {} ({})", tid, target.name);
            self.shared.emit(CoordinatorEvent::TargetRemoved {
                target_id: tid.clone(),
            });
            ids.push(tid);
        }
        Ok(ids)
    }

    /// Remove every target; returns how many were removed.
    pub async fn close_all(&self) -> usize {
        let roots = self.arena.read().roots.clone();
        let mut count = 0;
        for root in roots {
            match self.remove_target(&root).await {
                Ok(removed) => count += removed.len(),
                Err(e) => debug!("Target {} already removed: {}", root, e),
            }
        }
        count
    }

    /// The target forest in depth-first pre-order.
    pub fn get_target_tree(&self) -> Vec<TargetNode> {
        self.arena
            .read()
            .pre_order()
            .into_iter()
            .map(|(id, target)| TargetNode {
                id: id.clone(),
                name: target.name.clone(),
                parent_id: target.parent_id.clone(),
                children: target.children.clone(),
                state: target.session.state(),
            })
            .collect()
    }

    /// Session of a target.
    pub fn session(&self, id: &TargetId) -> Option<Arc<DebugSession>> {
        self.arena
            .read()
            .targets
            .get(id)
            .map(|target| target.session.clone())
    }

    /// Number of registered targets.
    pub fn target_count(&self) -> usize {
        self.arena.read().targets.len()
    }

    fn sessions(&self) -> Vec<(TargetId, Arc<DebugSession>)> {
        self.arena
            .read()
            .pre_order()
            .into_iter()
            .map(|(id, target)| (id.clone(), target.session.clone()))
            .collect()
    }

    // Global breakpoints

    /// Set a breakpoint on several targets at once.
    ///
    /// Each target is attempted regardless of failures elsewhere. The result
    /// lists only the targets where the breakpoint was installed; every other
    /// target produces one [`CoordinatorEvent::BreakpointError`].
    pub async fn set_global_breakpoint(
        &self,
        file: &str,
        line: u32,
        target_ids: &[TargetId],
        condition: Option<String>,
    ) -> Result<GlobalBreakpoint> {
        if target_ids.is_empty() {
            return Err(Error::InvalidInput(
                "a global breakpoint needs at least one target".to_string(),
            ));
        }

        let id = GlobalBreakpointId::new(self.next_global_id.fetch_add(1, Ordering::Relaxed));
        let mut seen = HashSet::new();
        let candidates: Vec<(TargetId, Option<Arc<DebugSession>>)> = {
            let arena = self.arena.read();
            target_ids
                .iter()
                .filter(|tid| seen.insert(*tid))
                .map(|tid| {
                    let session = arena.targets.get(tid).map(|t| t.session.clone());
                    (tid.clone(), session)
                })
                .collect()
        };

        let attempts = candidates.into_iter().map(|(tid, session)| {
            let condition = condition.clone();
            async move {
                let result = match session {
                    Some(session) => session.set_breakpoint(file, line, condition).await,
                    None => Err(Error::TargetNotFound(tid.clone())),
                };
                (tid, result)
            }
        });

        let mut targets = BTreeMap::new();
        for (tid, result) in join_all(attempts).await {
            match result {
                Ok(breakpoint) => {
                    targets.insert(tid, breakpoint.id);
                }
                Err(e) => {
                    warn!("Global breakpoint {} failed on {}: {}", id, tid, e);
                    self.shared.emit(CoordinatorEvent::BreakpointError {
                        breakpoint: id,
                        target_id: tid,
                        message: e.to_string(),
                    });
                }
            }
        }

        let breakpoint = GlobalBreakpoint {
            id,
            file: file.to_string(),
            line,
            condition,
            targets,
        };
        info!(
            "Global breakpoint {} at {}:{} installed on {} of {} targets",
            id,
            file,
            line,
            breakpoint.targets.len(),
            seen.len()
        );
        self.global_breakpoints
            .lock()
            .insert(id, breakpoint.clone());
        Ok(breakpoint)
    }

    /// Remove a global breakpoint from every target it was installed on.
    ///
    /// Targets that have since been removed are skipped.
    pub async fn remove_global_breakpoint(&self, id: GlobalBreakpointId) -> Result<()> {
        let breakpoint = self
            .global_breakpoints
            .lock()
            .remove(&id)
            .ok_or(Error::GlobalBreakpointNotFound(id))?;

        let removals: Vec<_> = {
            let arena = self.arena.read();
            breakpoint
                .targets
                .iter()
                .filter_map(|(tid, local)| match arena.targets.get(tid) {
                    Some(target) => Some((tid.clone(), *local, target.session.clone())),
                    None => {
                        debug!("Skipping removed target {} for {}", tid, id);
                        None
                    }
                })
                .collect()
        };

        let results = join_all(removals.into_iter().map(|(tid, local, session)| async move {
            (tid, session.remove_breakpoint(local).await)
        }))
        .await;

        for (tid, result) in results {
            if let Err(e) = result {
                warn!("Failed to remove {} from {}: {}", id, tid, e);
            }
        }
        info!("Removed global breakpoint {}", id);
        Ok(())
    }

    /// A global breakpoint by id.
    pub fn get_global_breakpoint(&self, id: GlobalBreakpointId) -> Option<GlobalBreakpoint> {
        self.global_breakpoints.lock().get(&id).cloned()
    }

    /// Every global breakpoint, ordered by id.
    pub fn list_global_breakpoints(&self) -> Vec<GlobalBreakpoint> {
        self.global_breakpoints.lock().values().cloned().collect()
    }

    fn forget_target_breakpoints(&self, id: &TargetId) {
        for breakpoint in self.global_breakpoints.lock().values_mut() {
            breakpoint.targets.remove(id);
        }
    }

    // Fan-out control

    /// Resume every target.
    pub async fn continue_all(&self) -> FanOutReport {
        self.fan_out(FanOutOperation::Continue).await
    }

    /// Pause every target.
    pub async fn pause_all(&self) -> FanOutReport {
        self.fan_out(FanOutOperation::Pause).await
    }

    /// Stop every target. Targets stay registered in their terminal state.
    pub async fn stop_all(&self) -> FanOutReport {
        self.fan_out(FanOutOperation::Stop).await
    }

    async fn fan_out(&self, operation: FanOutOperation) -> FanOutReport {
        let sessions = self.sessions();
        debug!("Fanning out {} to {} targets", operation, sessions.len());

        let results = join_all(sessions.into_iter().map(|(tid, session)| async move {
            let result = match operation {
                FanOutOperation::Continue => session.continue_().await.map(|_| ()),
                FanOutOperation::Pause => session.pause().await.map(|_| ()),
                FanOutOperation::Stop => session.stop().await,
            };
            (tid, result)
        }))
        .await;

        let mut report = FanOutReport {
            operation,
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
        for (tid, result) in results {
            match result {
                Ok(()) => report.succeeded.push(tid),
                Err(e) => {
                    warn!("{} failed on target {}: {}", operation, tid, e);
                    self.shared.emit(CoordinatorEvent::TargetError {
                        operation,
                        target_id: tid.clone(),
                        message: e.to_string(),
                    });
                    report.failed.push(TargetFailure {
                        target_id: tid,
                        message: e.to_string(),
                    });
                }
            }
        }
        report
    }

    // Aggregated log

    /// Read the aggregated log.
    pub fn get_aggregated_logs(&self, query: &LogQuery) -> Vec<LogEntry> {
        self.shared.log.lock().query(query)
    }

    /// Number of entries currently retained in the aggregated log.
    pub fn log_len(&self) -> usize {
        self.shared.log.lock().len()
    }

    /// Append a caller-supplied entry to the aggregated log.
    pub fn log(&self, target_id: &TargetId, level: LogLevel, message: impl Into<String>) -> Result<()> {
        let name = self
            .arena
            .read()
            .targets
            .get(target_id)
            .map(|target| target.name.clone())
            .ok_or_else(|| Error::TargetNotFound(target_id.clone()))?;
        self.shared.append(target_id, &name, level, message.into());
        Ok(())
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        for target in self.arena.get_mut().targets.values() {
            if let Some(forwarder) = &target.forwarder {
                forwarder.abort();
            }
        }
    }
}

/// Copy a session's events into the aggregated log until it terminates.
async fn forward_session_events(
    shared: Arc<Shared>,
    id: TargetId,
    name: String,
    mut events: broadcast::Receiver<SessionEvent>,
) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Terminated) => {
                shared.append(&id, &name, LogLevel::Debug, "Session terminated".to_string());
                break;
            }
            Ok(event) => {
                if let Some((level, message)) = describe(&event) {
                    shared.append(&id, &name, level, message);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Log forwarder for {} lagged by {} events", id, skipped);
                shared.append(
                    &id,
                    &name,
                    LogLevel::Debug,
                    format!("{} session events dropped", skipped),
                );
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("Log forwarder for target {} stopped", id);
}

fn describe(event: &SessionEvent) -> Option<(LogLevel, String)> {
    let described = match event {
        SessionEvent::Output { level, message } => (*level, message.clone()),
        SessionEvent::Paused { location, reason } => {
            let at = location
                .as_ref()
                .map_or_else(|| "unknown location".to_string(), |loc| loc.to_string());
            (LogLevel::Debug, format!("Paused at {} ({:?})", at, reason))
        }
        SessionEvent::Resumed => (LogLevel::Debug, "Resumed".to_string()),
        SessionEvent::BreakpointVerified(bp) => (
            LogLevel::Debug,
            format!("Breakpoint {} verified at {}:{}", bp.id, bp.file, bp.line),
        ),
        SessionEvent::BreakpointError {
            breakpoint,
            message,
        } => (
            LogLevel::Debug,
            format!("Breakpoint {} condition failed: {}", breakpoint, message),
        ),
        SessionEvent::StateChanged { .. } | SessionEvent::Terminated => return None,
    };
    Some(described)
}
