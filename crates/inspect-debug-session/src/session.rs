//! Debug session state machine.
//!
//! A [`DebugSession`] owns the connection to one target (and the process, when
//! it launched one). Its state lives in a `watch` channel so callers can wait on
//! it, while a background pump translates inspector events into state changes
//! and [`SessionEvent`]s.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use inspect_debug_core::{
    millis, Breakpoint, BreakpointId, CallFrame, DebugConfig, Error, EvaluationResult, LogLevel,
    PauseReason, Result, Scope, SessionId, SessionInfo, SessionOperation, SessionSettings,
    SessionState, SourceLocation, Variable,
};
use inspect_debug_protocol::{
    CpuProfile, HeapSnapshot, InspectorClient, InspectorEvent, LaunchSpec, Launcher, PausedEvent,
    ProcessOutput, TargetProcess, TransportConfig,
};

use crate::breakpoints::BreakpointManager;
use crate::output::{OutputBuffer, OutputRead};

/// Pause reason reported for the first statement of an `--inspect-brk` target.
const ENTRY_REASON: &str = "Break on start";

/// Settings for one session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Stay paused at the entry pause instead of resuming
    pub stop_on_entry: bool,
    /// Bound on how long steps and pauses wait for the target to stop
    pub step_timeout: Duration,
    /// Capacity of the session event channel
    pub event_buffer: usize,
    /// Lines of output retained
    pub output_buffer_lines: usize,
    /// Transport timeouts
    pub transport: TransportConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_settings(&SessionSettings::default(), TransportConfig::default())
    }
}

impl SessionOptions {
    /// Options from the `session` and `transport` sections of a config.
    pub fn from_config(config: &DebugConfig) -> Self {
        Self::from_settings(&config.session, TransportConfig::from(&config.transport))
    }

    fn from_settings(settings: &SessionSettings, transport: TransportConfig) -> Self {
        Self {
            stop_on_entry: settings.stop_on_entry,
            step_timeout: Duration::from_millis(settings.step_timeout_ms),
            event_buffer: settings.event_buffer,
            output_buffer_lines: settings.output_buffer_lines,
            transport,
        }
    }

    /// Set whether the entry pause is kept.
    pub fn with_stop_on_entry(mut self, stop_on_entry: bool) -> Self {
        self.stop_on_entry = stop_on_entry;
        self
    }

    /// Set the step/pause timeout.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Set the transport timeouts.
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct SessionSnapshot {
    /// Lifecycle state
    pub state: SessionState,
    /// Pause location; `None` unless paused
    pub location: Option<SourceLocation>,
    /// Call stack of the current pause; empty unless paused
    pub call_stack: Vec<CallFrame>,
    /// Why the target paused; `None` unless paused
    pub pause_reason: Option<PauseReason>,
    #[serde(skip)]
    generation: u64,
}

impl SessionSnapshot {
    pub(crate) fn new(state: SessionState) -> Self {
        Self {
            state,
            location: None,
            call_stack: Vec::new(),
            pause_reason: None,
            generation: 0,
        }
    }

    /// Whether the session is paused.
    pub fn is_paused(&self) -> bool {
        self.state == SessionState::Paused
    }

    /// Whether the session is paused or terminated.
    pub fn is_stopped(&self) -> bool {
        self.is_paused() || self.state.is_terminated()
    }

    /// Innermost frame of the current pause.
    pub fn top_frame(&self) -> Option<&CallFrame> {
        self.call_stack.first()
    }

    fn clear_pause(&mut self) {
        self.location = None;
        self.call_stack.clear();
        self.pause_reason = None;
    }
}

/// Notification published by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Lifecycle state changed
    StateChanged {
        /// Previous state
        from: SessionState,
        /// New state
        to: SessionState,
    },
    /// Target stopped
    Paused {
        /// Where it stopped
        location: Option<SourceLocation>,
        /// Why it stopped
        reason: PauseReason,
    },
    /// Target resumed
    Resumed,
    /// A breakpoint was bound to loaded code after it was set
    BreakpointVerified(Breakpoint),
    /// A breakpoint condition threw while being evaluated
    BreakpointError {
        /// Breakpoint whose condition failed
        breakpoint: BreakpointId,
        /// Error message
        message: String,
    },
    /// A line of target output
    Output {
        /// Stream
        level: LogLevel,
        /// Line text
        message: String,
    },
    /// Session terminated
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PauseIntent {
    None,
    Pause,
    Step,
}

struct SessionShared {
    id: SessionId,
    name: String,
    client: InspectorClient,
    snapshot: watch::Sender<SessionSnapshot>,
    breakpoints: BreakpointManager,
    events: broadcast::Sender<SessionEvent>,
    output: Mutex<OutputBuffer>,
    process: tokio::sync::Mutex<Option<TargetProcess>>,
    pid: Option<u32>,
    launched: bool,
    intent: Mutex<PauseIntent>,
    stop_on_entry: bool,
}

impl SessionShared {
    fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    fn state(&self) -> SessionState {
        self.snapshot.borrow().state
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Apply `f` to the snapshot; returns the new generation if it changed.
    fn modify(&self, f: impl FnOnce(&mut SessionSnapshot) -> bool) -> Option<u64> {
        let mut change = None;
        self.snapshot.send_if_modified(|snap| {
            let from = snap.state;
            if !f(snap) {
                return false;
            }
            snap.generation += 1;
            change = Some((from, snap.state, snap.generation));
            true
        });

        let (from, to, generation) = change?;
        if from != to {
            info!("Session {} ({}): {} -> {}", self.id, self.name, from, to);
            self.emit(SessionEvent::StateChanged { from, to });
        }
        Some(generation)
    }

    fn set_intent(&self, intent: PauseIntent) {
        *self.intent.lock() = intent;
    }

    fn take_intent(&self) -> PauseIntent {
        std::mem::replace(&mut *self.intent.lock(), PauseIntent::None)
    }

    fn record_output(&self, level: LogLevel, message: String) {
        self.output.lock().append(level, message.clone());
        self.emit(SessionEvent::Output { level, message });
    }

    /// Move to `Running` for a control operation that is about to be sent.
    ///
    /// Returns the snapshot to restore if sending fails, plus the generation
    /// that restore is conditional on.
    fn begin_running(&self, operation: SessionOperation) -> Result<(SessionSnapshot, u64)> {
        let mut previous = None;
        let mut rejected = None;
        let generation = self.modify(|snap| {
            if let Err(e) = operation.check(snap.state) {
                rejected = Some(e);
                return false;
            }
            previous = Some(snap.clone());
            snap.state = operation
                .resulting_state()
                .unwrap_or(SessionState::Running);
            snap.clear_pause();
            true
        });

        if let Some(e) = rejected {
            return Err(e);
        }
        match (previous, generation) {
            (Some(previous), Some(generation)) => {
                self.emit(SessionEvent::Resumed);
                Ok((previous, generation))
            }
            _ => Err(Error::InvalidState {
                operation,
                state: self.state(),
            }),
        }
    }

    /// Undo [`SessionShared::begin_running`] unless an event already moved on.
    fn restore(&self, previous: SessionSnapshot, generation: u64) {
        self.modify(|snap| {
            if snap.generation != generation {
                return false;
            }
            let current = snap.generation;
            *snap = previous;
            snap.generation = current;
            true
        });
    }

    /// Terminate the session if `err` means the target is gone.
    async fn fail(&self, err: Error) -> Error {
        if err.is_connection_loss() {
            warn!("Session {} lost its target: {}", self.id, err);
            self.shutdown("connection lost").await;
        }
        err
    }

    async fn settle<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Drive the session to `Terminated`. Concurrent callers wait for the
    /// first one to finish.
    async fn shutdown(&self, reason: &str) {
        let claimed = self
            .modify(|snap| {
                if snap.state.is_terminal() {
                    return false;
                }
                snap.state = SessionState::Terminating;
                true
            })
            .is_some();

        if !claimed {
            let mut rx = self.snapshot.subscribe();
            let _ = rx.wait_for(|snap| snap.state.is_terminated()).await;
            return;
        }

        info!("Stopping session {} ({}): {}", self.id, self.name, reason);
        self.client.close().await;
        if let Some(process) = self.process.lock().await.as_mut() {
            if let Err(e) = process.kill().await {
                warn!("Failed to kill target of session {}: {}", self.id, e);
            }
        }

        self.modify(|snap| {
            snap.state = SessionState::Terminated;
            snap.clear_pause();
            true
        });
        self.emit(SessionEvent::Terminated);
    }

    async fn resume_silently(&self) {
        if let Err(e) = self.client.resume().await {
            warn!("Session {} failed to resume target: {}", self.id, e);
        }
    }

    async fn on_paused(&self, paused: PausedEvent) {
        let intent = self.take_intent();

        let reason = if paused.reason == ENTRY_REASON && intent == PauseIntent::None {
            if !self.stop_on_entry {
                debug!("Session {} resuming past entry pause", self.id);
                self.resume_silently().await;
                return;
            }
            PauseReason::Entry
        } else if !paused.hit_breakpoints.is_empty() {
            self.breakpoints.settled().await;
            let hits = self.breakpoints.resolve_hits(&paused.hit_breakpoints);
            if !hits.is_silent() {
                self.breakpoint_reason(&paused, hits.active).await
            } else {
                match intent {
                    PauseIntent::Step => PauseReason::Step,
                    PauseIntent::Pause => PauseReason::Pause,
                    PauseIntent::None => {
                        debug!(
                            "Session {} resuming past inactive breakpoints {:?}",
                            self.id, hits
                        );
                        self.resume_silently().await;
                        return;
                    }
                }
            }
        } else {
            match intent {
                PauseIntent::Step => PauseReason::Step,
                PauseIntent::Pause => PauseReason::Pause,
                PauseIntent::None => match paused.reason.as_str() {
                    "exception" | "promiseRejection" => PauseReason::Exception {
                        description: paused.exception.clone(),
                    },
                    other => PauseReason::Other {
                        reason: other.to_string(),
                    },
                },
            }
        };

        self.enter_paused(paused, reason);
    }

    async fn breakpoint_reason(
        &self,
        paused: &PausedEvent,
        active: Vec<BreakpointId>,
    ) -> PauseReason {
        let conditional = active.iter().copied().find(|id| {
            self.breakpoints
                .get(*id)
                .is_some_and(|bp| bp.condition.is_some())
        });

        if let (Some(id), Some(frame)) = (conditional, paused.call_frames.first()) {
            match self.client.take_condition_error(&frame.frame_id).await {
                Ok(Some(message)) => {
                    warn!("Condition of breakpoint {} failed: {}", id, message);
                    self.emit(SessionEvent::BreakpointError {
                        breakpoint: id,
                        message: message.clone(),
                    });
                    return PauseReason::ConditionError {
                        breakpoint: id,
                        message,
                    };
                }
                Ok(None) => {}
                Err(e) => warn!("Could not read condition result of breakpoint {}: {}", id, e),
            }
        }

        PauseReason::Breakpoint { breakpoints: active }
    }

    fn enter_paused(&self, paused: PausedEvent, reason: PauseReason) {
        // A target can already be stopped when we finish attaching.
        self.modify(|snap| {
            if snap.state != SessionState::Initializing {
                return false;
            }
            snap.state = SessionState::Running;
            true
        });

        let location = paused.top_location().cloned();
        let changed = self.modify(|snap| {
            if snap.state.is_terminal() {
                return false;
            }
            snap.state = SessionState::Paused;
            snap.location = location.clone();
            snap.call_stack = paused.call_frames;
            snap.pause_reason = Some(reason.clone());
            true
        });

        if changed.is_some() {
            match &location {
                Some(loc) => info!("Session {} paused at {} ({:?})", self.id, loc, reason),
                None => info!("Session {} paused ({:?})", self.id, reason),
            }
            self.emit(SessionEvent::Paused { location, reason });
        }
    }

    fn on_resumed(&self) {
        let changed = self.modify(|snap| {
            if snap.state != SessionState::Paused {
                return false;
            }
            snap.state = SessionState::Running;
            snap.clear_pause();
            true
        });
        if changed.is_some() {
            self.emit(SessionEvent::Resumed);
        }
    }
}

async fn event_pump(shared: Arc<SessionShared>, mut events: mpsc::UnboundedReceiver<InspectorEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            InspectorEvent::Paused(paused) => shared.on_paused(paused).await,
            InspectorEvent::Resumed => shared.on_resumed(),
            InspectorEvent::BreakpointResolved {
                protocol_id,
                location,
            } => {
                if let Some(bp) = shared.breakpoints.mark_resolved(&protocol_id, location) {
                    shared.emit(SessionEvent::BreakpointVerified(bp));
                }
            }
            InspectorEvent::ScriptParsed { url, .. } => {
                debug!("Session {} loaded script {}", shared.id, url);
            }
            // Launched targets report the same text on their stdio.
            InspectorEvent::Console { level, text } if !shared.launched => {
                shared.record_output(level, text);
            }
            InspectorEvent::Exception { text } if !shared.launched => {
                shared.record_output(LogLevel::Stderr, text);
            }
            InspectorEvent::Console { .. } | InspectorEvent::Exception { .. } => {}
            InspectorEvent::ExecutionFinished => {
                shared.shutdown("target finished").await;
            }
            InspectorEvent::Disconnected => {
                shared.shutdown("connection lost").await;
                break;
            }
        }
    }
    debug!("Event pump of session {} finished", shared.id);
}

async fn forward_output(shared: Arc<SessionShared>, mut output: mpsc::UnboundedReceiver<ProcessOutput>) {
    while let Some(ProcessOutput { level, line }) = output.recv().await {
        shared.record_output(level, line);
    }
    debug!("Output of session {} ended", shared.id);
}

/// A debug session bound to one target.
pub struct DebugSession {
    shared: Arc<SessionShared>,
    op_lock: tokio::sync::Mutex<()>,
    step_timeout: Duration,
}

impl std::fmt::Debug for DebugSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugSession")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("state", &self.shared.state())
            .finish_non_exhaustive()
    }
}

impl DebugSession {
    /// Attach to an inspector endpoint.
    pub async fn attach(
        name: impl Into<String>,
        endpoint: &str,
        options: SessionOptions,
    ) -> Result<Self> {
        Self::start(name.into(), endpoint, options, None).await
    }

    /// Launch a target and attach to it.
    ///
    /// With `stop_on_entry` this returns once the entry pause arrived (or the
    /// step timeout elapsed).
    pub async fn launch(
        name: impl Into<String>,
        launcher: &dyn Launcher,
        spec: &LaunchSpec,
        options: SessionOptions,
    ) -> Result<Self> {
        let launched = launcher.launch(spec).await?;
        let wait_for_entry = options.stop_on_entry;
        let session = Self::start(name.into(), &launched.endpoint, options, launched.process).await?;

        if wait_for_entry {
            let entered = session
                .wait_until(SessionSnapshot::is_stopped, session.step_timeout)
                .await;
            if entered.is_none() {
                warn!("Session {} did not report an entry pause", session.id());
            }
        }
        Ok(session)
    }

    async fn start(
        name: String,
        endpoint: &str,
        options: SessionOptions,
        mut process: Option<TargetProcess>,
    ) -> Result<Self> {
        let id = SessionId::new();
        info!("Starting session {} ({}) on {}", id, name, endpoint);

        let client = InspectorClient::connect(endpoint, options.transport.clone()).await?;
        let events = client.subscribe();
        let output = process.as_mut().and_then(TargetProcess::take_output);

        let (snapshot, _) = watch::channel(SessionSnapshot::new(SessionState::Initializing));
        let (events_tx, _) = broadcast::channel(options.event_buffer.max(1));
        let shared = Arc::new(SessionShared {
            id,
            name,
            client,
            snapshot,
            breakpoints: BreakpointManager::new(),
            events: events_tx,
            output: Mutex::new(OutputBuffer::new(options.output_buffer_lines)),
            pid: process.as_ref().and_then(TargetProcess::pid),
            launched: process.is_some(),
            process: tokio::sync::Mutex::new(process),
            intent: Mutex::new(PauseIntent::None),
            stop_on_entry: options.stop_on_entry,
        });

        tokio::spawn(event_pump(shared.clone(), events));
        if let Some(output) = output {
            tokio::spawn(forward_output(shared.clone(), output));
        }

        let session = Self {
            shared,
            op_lock: tokio::sync::Mutex::new(()),
            step_timeout: options.step_timeout,
        };
        if let Err(e) = session.handshake().await {
            warn!("Session {} failed to start: {}", id, e);
            session.shared.shutdown("startup failed").await;
            return Err(e);
        }
        Ok(session)
    }

    async fn handshake(&self) -> Result<()> {
        let client = &self.shared.client;
        client.enable().await?;
        self.shared.modify(|snap| {
            if snap.state != SessionState::Initializing {
                return false;
            }
            snap.state = SessionState::Running;
            true
        });
        client.run_if_waiting_for_debugger().await
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// Human-readable name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Inspector endpoint.
    pub fn endpoint(&self) -> &str {
        self.shared.client.endpoint()
    }

    /// Process id of the launched target, if any.
    pub fn pid(&self) -> Option<u32> {
        self.shared.pid
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot()
    }

    /// Receiver of snapshot updates.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// Receive session events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Listing summary.
    pub fn info(&self) -> SessionInfo {
        let snapshot = self.shared.snapshot();
        SessionInfo {
            id: self.shared.id,
            name: self.shared.name.clone(),
            state: snapshot.state,
            endpoint: self.endpoint().to_string(),
            location: snapshot.location,
            breakpoint_count: self.shared.breakpoints.len(),
        }
    }

    pub(crate) async fn wait_until(
        &self,
        predicate: impl Fn(&SessionSnapshot) -> bool,
        timeout: Duration,
    ) -> Option<SessionSnapshot> {
        let mut rx = self.shared.snapshot.subscribe();
        let waited = tokio::time::timeout(timeout, async {
            rx.wait_for(|snap| predicate(snap))
                .await
                .map(|snap| snap.clone())
        })
        .await;
        match waited {
            Ok(Ok(snapshot)) => Some(snapshot),
            Ok(Err(_)) | Err(_) => None,
        }
    }

    // Execution control

    /// Resume a paused target.
    pub async fn continue_(&self) -> Result<SessionSnapshot> {
        self.control(SessionOperation::Continue).await
    }

    /// Step over the current statement and wait for the next stop.
    pub async fn step_over(&self) -> Result<SessionSnapshot> {
        self.control(SessionOperation::StepOver).await
    }

    /// Step into the current call and wait for the next stop.
    pub async fn step_into(&self) -> Result<SessionSnapshot> {
        self.control(SessionOperation::StepInto).await
    }

    /// Step out of the current function and wait for the next stop.
    pub async fn step_out(&self) -> Result<SessionSnapshot> {
        self.control(SessionOperation::StepOut).await
    }

    async fn control(&self, operation: SessionOperation) -> Result<SessionSnapshot> {
        let _guard = self.op_lock.lock().await;
        let (previous, generation) = self.shared.begin_running(operation)?;

        let stepping = operation != SessionOperation::Continue;
        self.shared.set_intent(if stepping {
            PauseIntent::Step
        } else {
            PauseIntent::None
        });

        let client = &self.shared.client;
        let sent = match operation {
            SessionOperation::StepOver => client.step_over().await,
            SessionOperation::StepInto => client.step_into().await,
            SessionOperation::StepOut => client.step_out().await,
            _ => client.resume().await,
        };
        if let Err(e) = sent {
            self.shared.set_intent(PauseIntent::None);
            self.shared.restore(previous, generation);
            return Err(self.shared.fail(e).await);
        }

        if stepping {
            self.await_stop(operation).await
        } else {
            Ok(self.shared.snapshot())
        }
    }

    /// Interrupt a running target and wait for it to stop.
    pub async fn pause(&self) -> Result<SessionSnapshot> {
        let _guard = self.op_lock.lock().await;
        SessionOperation::Pause.check(self.state())?;

        self.shared.set_intent(PauseIntent::Pause);
        if let Err(e) = self.shared.client.pause().await {
            self.shared.set_intent(PauseIntent::None);
            return Err(self.shared.fail(e).await);
        }
        self.await_stop(SessionOperation::Pause).await
    }

    async fn await_stop(&self, operation: SessionOperation) -> Result<SessionSnapshot> {
        match self
            .wait_until(SessionSnapshot::is_stopped, self.step_timeout)
            .await
        {
            Some(snapshot) => Ok(snapshot),
            None => {
                self.shared.set_intent(PauseIntent::None);
                Err(Error::Timeout {
                    method: operation.as_str().to_string(),
                    timeout_ms: millis(self.step_timeout),
                })
            }
        }
    }

    // Inspection

    fn paused_frame(&self, operation: SessionOperation, frame_index: usize) -> Result<CallFrame> {
        let snapshot = self.shared.snapshot();
        operation.check(snapshot.state)?;
        snapshot
            .call_stack
            .into_iter()
            .nth(frame_index)
            .ok_or_else(|| Error::InvalidInput(format!("No call frame at index {frame_index}")))
    }

    /// Evaluate an expression in a frame of the current pause (0 = innermost).
    pub async fn evaluate(&self, expression: &str, frame_index: usize) -> Result<EvaluationResult> {
        let _guard = self.op_lock.lock().await;
        let frame = self.paused_frame(SessionOperation::Evaluate, frame_index)?;
        let result = self
            .shared
            .client
            .evaluate_on_frame(&frame.frame_id, expression)
            .await;
        self.shared.settle(result).await
    }

    /// Call stack of the current pause.
    pub fn get_call_stack(&self) -> Result<Vec<CallFrame>> {
        let snapshot = self.shared.snapshot();
        SessionOperation::GetCallStack.check(snapshot.state)?;
        Ok(snapshot.call_stack)
    }

    /// Scope chain of a frame.
    pub fn get_scopes(&self, frame_index: usize) -> Result<Vec<Scope>> {
        Ok(self
            .paused_frame(SessionOperation::GetVariables, frame_index)?
            .scopes)
    }

    /// Variables of one scope of a frame.
    pub async fn get_variables(
        &self,
        frame_index: usize,
        scope_index: usize,
    ) -> Result<Vec<Variable>> {
        let frame = self.paused_frame(SessionOperation::GetVariables, frame_index)?;
        let scope = frame.scopes.get(scope_index).ok_or_else(|| {
            Error::InvalidInput(format!(
                "No scope at index {scope_index} in frame {frame_index}"
            ))
        })?;
        match &scope.object_id {
            Some(object_id) => self.get_variables_by_reference(object_id).await,
            None => Ok(Vec::new()),
        }
    }

    /// Properties of an object returned by an earlier inspection.
    pub async fn get_variables_by_reference(&self, object_id: &str) -> Result<Vec<Variable>> {
        let _guard = self.op_lock.lock().await;
        SessionOperation::GetVariables.check(self.state())?;
        let result = self.shared.client.get_properties(object_id).await;
        self.shared.settle(result).await
    }

    // Breakpoints

    /// Set a breakpoint at a 1-based `line` of `file`.
    pub async fn set_breakpoint(
        &self,
        file: &str,
        line: u32,
        condition: Option<String>,
    ) -> Result<Breakpoint> {
        let _guard = self.op_lock.lock().await;
        SessionOperation::SetBreakpoint.check(self.state())?;
        let result = self
            .shared
            .breakpoints
            .set(&self.shared.client, file, line, condition)
            .await;
        self.shared.settle(result).await
    }

    /// Remove a breakpoint.
    pub async fn remove_breakpoint(&self, id: BreakpointId) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        SessionOperation::RemoveBreakpoint.check(self.state())?;
        let result = self
            .shared
            .breakpoints
            .remove(&self.shared.client, id)
            .await;
        self.shared.settle(result).await
    }

    /// Enable or disable a breakpoint without removing it.
    pub async fn toggle_breakpoint(&self, id: BreakpointId, enabled: bool) -> Result<Breakpoint> {
        let _guard = self.op_lock.lock().await;
        SessionOperation::ToggleBreakpoint.check(self.state())?;
        let result = self
            .shared
            .breakpoints
            .toggle(&self.shared.client, id, enabled)
            .await;
        self.shared.settle(result).await
    }

    /// Breakpoints in creation order.
    pub fn list_breakpoints(&self) -> Result<Vec<Breakpoint>> {
        SessionOperation::ListBreakpoints.check(self.state())?;
        Ok(self.shared.breakpoints.list())
    }

    // Profiling

    /// Start CPU sampling.
    pub async fn start_cpu_profile(&self) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        SessionOperation::Profile.check(self.state())?;
        let result = self.shared.client.start_cpu_profile().await;
        self.shared.settle(result).await
    }

    /// Stop CPU sampling and return the profile.
    pub async fn stop_cpu_profile(&self) -> Result<CpuProfile> {
        let _guard = self.op_lock.lock().await;
        SessionOperation::Profile.check(self.state())?;
        let result = self.shared.client.stop_cpu_profile().await;
        self.shared.settle(result).await
    }

    /// Capture a heap snapshot.
    pub async fn take_heap_snapshot(&self) -> Result<HeapSnapshot> {
        let _guard = self.op_lock.lock().await;
        SessionOperation::Profile.check(self.state())?;
        let result = self.shared.client.take_heap_snapshot().await;
        self.shared.settle(result).await
    }

    // Output

    /// Read captured output, either everything retained or only new lines.
    pub fn read_output(&self, since_last_read: bool) -> OutputRead {
        let mut output = self.shared.output.lock();
        if since_last_read {
            output.read_since_last()
        } else {
            output.read_all()
        }
    }

    /// Terminate the session. Succeeds on an already terminated session.
    pub async fn stop(&self) -> Result<()> {
        self.shared.shutdown("stop requested").await;
        Ok(())
    }
}

impl Drop for DebugSession {
    fn drop(&mut self) {
        if self.shared.state().is_terminal() {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let shared = self.shared.clone();
            handle.spawn(async move {
                shared.shutdown("session dropped").await;
            });
        }
    }
}
