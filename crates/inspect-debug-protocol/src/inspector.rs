//! Typed inspector client.
//!
//! Wraps a [`Connection`] with one method per protocol command used by the
//! session engine, and translates raw events into [`InspectorEvent`]s. All
//! locations leaving this module are 1-based and mapped through source maps
//! when one applies.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use inspect_debug_core::{
    CallFrame, Error, EvaluationResult, LogLevel, Result, Scope, ScopeKind, SourceLocation,
    Variable,
};

use crate::message::EventMessage;
use crate::sourcemap::{load_source_map, path_to_url, url_to_path, SourceMapRegistry};
use crate::transport::{Connection, TransportConfig};
use crate::types::{
    BreakpointResolvedParams, ConsoleApiCalledParams, EvaluateResult, ExceptionThrownParams,
    ExecutionContextCreatedParams, ExecutionContextDestroyedParams, GetPropertiesResult,
    HeapSnapshotChunkParams, PausedParams, ProtocolCallFrame, RemoteObject, ScriptParsedParams,
    SetBreakpointResult,
};

/// Global the guarded condition stores evaluation errors in.
pub const CONDITION_ERROR_GLOBAL: &str = "__inspectDebugConditionError";

const GUARD_PREFIX: &str = "(function(){try{return !!(";

fn guard_suffix() -> String {
    format!(");}}catch(e){{globalThis.{CONDITION_ERROR_GLOBAL}=String(e);return true;}}}})()")
}

/// Wrap a breakpoint condition so that a throwing condition pauses the target
/// and leaves the error in [`CONDITION_ERROR_GLOBAL`].
pub fn guard_condition(condition: &str) -> String {
    format!("{GUARD_PREFIX}{condition}{}", guard_suffix())
}

/// Recover the caller's condition from a guarded expression.
pub fn unguard_condition(expression: &str) -> Option<&str> {
    expression
        .strip_prefix(GUARD_PREFIX)?
        .strip_suffix(guard_suffix().as_str())
}

/// Regex matching any script URL that ends with `file`.
pub fn url_suffix_regex(file: &str) -> String {
    format!(
        r"(^|[/\\]){}$",
        regex::escape(file.trim_start_matches("./"))
    )
}

/// A pause reported by the target.
#[derive(Debug, Clone, PartialEq)]
pub struct PausedEvent {
    /// Raw reason (`other`, `exception`, `Break on start`, ...)
    pub reason: String,
    /// Protocol ids of the breakpoints that were hit
    pub hit_breakpoints: Vec<String>,
    /// Stack, innermost first
    pub call_frames: Vec<CallFrame>,
    /// Exception description for exception pauses
    pub exception: Option<String>,
}

impl PausedEvent {
    /// Location of the innermost frame.
    pub fn top_location(&self) -> Option<&SourceLocation> {
        self.call_frames.first().map(|f| &f.location)
    }
}

/// Typed events produced by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum InspectorEvent {
    /// The target stopped
    Paused(PausedEvent),
    /// The target resumed
    Resumed,
    /// A breakpoint bound to a location after being set
    BreakpointResolved {
        /// Protocol breakpoint id
        protocol_id: String,
        /// Where it bound
        location: SourceLocation,
    },
    /// A script was parsed
    ScriptParsed {
        /// Script id
        script_id: String,
        /// Script URL
        url: String,
    },
    /// Console API output
    Console {
        /// `stderr` for error/warn calls, `stdout` otherwise
        level: LogLevel,
        /// Arguments joined by spaces
        text: String,
    },
    /// An uncaught exception
    Exception {
        /// Exception description
        text: String,
    },
    /// The main execution context was destroyed: the program finished
    ExecutionFinished,
    /// The connection ended; sent exactly once per subscriber
    Disconnected,
}

/// Where a breakpoint landed when it was set.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointPlacement {
    /// Protocol breakpoint id
    pub protocol_id: String,
    /// Locations already bound (empty until a script matches)
    pub locations: Vec<SourceLocation>,
}

/// A finished CPU profile.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuProfile {
    /// Raw profile as sent by the target
    pub profile: Value,
    /// Number of call tree nodes
    pub node_count: usize,
    /// Number of samples
    pub sample_count: usize,
    /// Profile duration in microseconds
    pub duration_us: i64,
}

/// A captured heap snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct HeapSnapshot {
    /// Concatenated snapshot JSON
    pub data: String,
    /// Number of chunks the target sent
    pub chunk_count: usize,
}

impl HeapSnapshot {
    /// Snapshot size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// A breakpoint that bound nowhere and may target an original source whose
/// map has not loaded yet.
#[derive(Debug, Clone)]
struct DeferredBreakpoint {
    file: String,
    /// 1-based
    line: u32,
    condition: Option<String>,
}

/// `Debugger.setBreakpointByUrl` parameters for a 1-based `line` of `file`,
/// and whether a source map translated the position.
fn placement_params(
    maps: &SourceMapRegistry,
    file: &str,
    line: u32,
    condition: Option<&str>,
) -> (Map<String, Value>, bool) {
    let mut params = Map::new();
    let mapped = match maps.to_generated(file, line - 1) {
        Some((url, gen_line, gen_column)) => {
            debug!("Mapped {}:{} to {}:{}", file, line, url, gen_line + 1);
            params.insert("url".into(), json!(url));
            params.insert("lineNumber".into(), json!(gen_line));
            params.insert("columnNumber".into(), json!(gen_column));
            true
        }
        None => {
            if file.contains("://") {
                params.insert("url".into(), json!(file));
            } else if Path::new(file).is_absolute() {
                params.insert("url".into(), json!(path_to_url(file)));
            } else {
                params.insert("urlRegex".into(), json!(url_suffix_regex(file)));
            }
            params.insert("lineNumber".into(), json!(line - 1));
            false
        }
    };
    if let Some(condition) = condition {
        params.insert("condition".into(), json!(condition));
    }
    (params, mapped)
}

struct ClientShared {
    connection: Connection,
    source_maps: RwLock<SourceMapRegistry>,
    /// Unbound breakpoints keyed by protocol id
    deferred: Mutex<HashMap<String, DeferredBreakpoint>>,
    /// Protocol id callers know → id of the breakpoint that replaced it
    rebound: Mutex<HashMap<String, String>>,
    /// Script id → URL
    scripts: RwLock<HashMap<String, String>>,
    main_context: Mutex<Option<i64>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<InspectorEvent>>>,
    disconnected: AtomicBool,
}

impl ClientShared {
    fn broadcast(&self, event: InspectorEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn finish(&self) {
        let mut subscribers = self.subscribers.lock();
        self.disconnected.store(true, Ordering::SeqCst);
        for tx in subscribers.drain(..) {
            let _ = tx.send(InspectorEvent::Disconnected);
        }
    }

    /// The protocol id callers know a breakpoint by.
    fn original_id(&self, protocol_id: &str) -> String {
        self.rebound
            .lock()
            .iter()
            .find(|(_, current)| current.as_str() == protocol_id)
            .map(|(original, _)| original.clone())
            .unwrap_or_else(|| protocol_id.to_string())
    }

    async fn set_by_url(&self, params: Map<String, Value>) -> Result<SetBreakpointResult> {
        let value = self
            .connection
            .send("Debugger.setBreakpointByUrl", Value::Object(params))
            .await?;
        serde_json::from_value(value).map_err(|e| {
            Error::Protocol(format!(
                "Malformed 'Debugger.setBreakpointByUrl' response: {e}"
            ))
        })
    }

    fn placement_locations(&self, result: &SetBreakpointResult) -> Vec<SourceLocation> {
        result
            .locations
            .iter()
            .map(|loc| {
                self.location_for(
                    &loc.script_id,
                    "",
                    loc.line_number,
                    loc.column_number.unwrap_or(0),
                )
            })
            .collect()
    }

    /// Place deferred breakpoints that a newly loaded source map now covers.
    ///
    /// The replacement keeps the original protocol id towards callers, so
    /// resolutions and hits arrive under the id they already hold.
    async fn rebind_deferred(&self) {
        let ready: Vec<(String, Map<String, Value>)> = {
            let maps = self.source_maps.read();
            self.deferred
                .lock()
                .iter()
                .filter_map(|(id, bp)| {
                    let (params, mapped) =
                        placement_params(&maps, &bp.file, bp.line, bp.condition.as_deref());
                    mapped.then(|| (id.clone(), params))
                })
                .collect()
        };

        for (original, params) in ready {
            let result = match self.set_by_url(params).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Failed to re-bind breakpoint {}: {}", original, e);
                    continue;
                }
            };

            if self.deferred.lock().remove(&original).is_none() {
                // Removed by the caller while the replacement was in flight.
                self.remove_on_target(&result.breakpoint_id).await;
                continue;
            }
            debug!("Re-bound breakpoint {} as {}", original, result.breakpoint_id);
            self.rebound
                .lock()
                .insert(original.clone(), result.breakpoint_id.clone());
            self.remove_on_target(&original).await;

            for location in self.placement_locations(&result) {
                self.broadcast(InspectorEvent::BreakpointResolved {
                    protocol_id: original.clone(),
                    location,
                });
            }
        }
    }

    async fn remove_on_target(&self, protocol_id: &str) {
        if let Err(e) = self
            .connection
            .send(
                "Debugger.removeBreakpoint",
                json!({ "breakpointId": protocol_id }),
            )
            .await
        {
            warn!("Failed to remove breakpoint {}: {}", protocol_id, e);
        }
    }

    fn location_for(&self, script_id: &str, url: &str, line: u32, column: u32) -> SourceLocation {
        let url = if url.is_empty() {
            self.scripts
                .read()
                .get(script_id)
                .cloned()
                .unwrap_or_else(|| script_id.to_string())
        } else {
            url.to_string()
        };

        if let Some((source, line, column)) = self.source_maps.read().to_original(&url, line, column)
        {
            return SourceLocation::new(source, line + 1, column + 1);
        }
        SourceLocation::new(url_to_path(&url), line + 1, column + 1)
    }

    fn convert_frame(&self, index: usize, frame: ProtocolCallFrame) -> CallFrame {
        let location = self.location_for(
            &frame.location.script_id,
            &frame.url,
            frame.location.line_number,
            frame.location.column_number.unwrap_or(0),
        );
        let scopes = frame
            .scope_chain
            .into_iter()
            .map(|s| Scope {
                kind: ScopeKind::from_protocol(&s.kind),
                name: s.name,
                object_id: s.object.object_id,
            })
            .collect();

        CallFrame {
            index,
            frame_id: frame.call_frame_id,
            function_name: frame.function_name,
            location,
            scopes,
        }
    }

    async fn translate(&self, event: EventMessage) -> Option<InspectorEvent> {
        match event.method.as_str() {
            "Debugger.paused" => {
                let params: PausedParams = decode_event(&event)?;
                let exception = match params.reason.as_str() {
                    "exception" | "promiseRejection" => params
                        .data
                        .and_then(|d| serde_json::from_value::<RemoteObject>(d).ok())
                        .map(|obj| obj.render_plain()),
                    _ => None,
                };
                let call_frames = params
                    .call_frames
                    .into_iter()
                    .enumerate()
                    .map(|(i, f)| self.convert_frame(i, f))
                    .collect();
                let hit_breakpoints = params
                    .hit_breakpoints
                    .iter()
                    .map(|id| self.original_id(id))
                    .collect();
                Some(InspectorEvent::Paused(PausedEvent {
                    reason: params.reason,
                    hit_breakpoints,
                    call_frames,
                    exception,
                }))
            }
            "Debugger.resumed" => Some(InspectorEvent::Resumed),
            "Debugger.breakpointResolved" => {
                let params: BreakpointResolvedParams = decode_event(&event)?;
                let location = self.location_for(
                    &params.location.script_id,
                    "",
                    params.location.line_number,
                    params.location.column_number.unwrap_or(0),
                );
                let protocol_id = self.original_id(&params.breakpoint_id);
                self.deferred.lock().remove(&protocol_id);
                Some(InspectorEvent::BreakpointResolved {
                    protocol_id,
                    location,
                })
            }
            "Debugger.scriptParsed" => {
                let params: ScriptParsedParams = decode_event(&event)?;
                self.scripts
                    .write()
                    .insert(params.script_id.clone(), params.url.clone());

                if let Some(map_url) = params.source_map_url.as_deref().filter(|u| !u.is_empty())
                {
                    match load_source_map(&params.url, map_url).await {
                        Ok(map) => {
                            debug!(
                                "Loaded source map for {} ({} sources)",
                                params.url,
                                map.sources().len()
                            );
                            self.source_maps.write().insert(&params.url, map);
                            self.rebind_deferred().await;
                        }
                        Err(e) => warn!("Ignoring source map of {}: {}", params.url, e),
                    }
                }

                Some(InspectorEvent::ScriptParsed {
                    script_id: params.script_id,
                    url: params.url,
                })
            }
            "Runtime.consoleAPICalled" => {
                let params: ConsoleApiCalledParams = decode_event(&event)?;
                let level = match params.kind.as_str() {
                    "error" | "warning" | "assert" | "trace" => LogLevel::Stderr,
                    _ => LogLevel::Stdout,
                };
                let text = params
                    .args
                    .iter()
                    .map(RemoteObject::render_plain)
                    .collect::<Vec<_>>()
                    .join(" ");
                Some(InspectorEvent::Console { level, text })
            }
            "Runtime.exceptionThrown" => {
                let params: ExceptionThrownParams = decode_event(&event)?;
                Some(InspectorEvent::Exception {
                    text: params.exception_details.describe(),
                })
            }
            "Runtime.executionContextCreated" => {
                let params: ExecutionContextCreatedParams = decode_event(&event)?;
                self.main_context.lock().get_or_insert(params.context.id);
                None
            }
            "Runtime.executionContextDestroyed" => {
                let params: ExecutionContextDestroyedParams = decode_event(&event)?;
                let main = *self.main_context.lock();
                (main == Some(params.execution_context_id))
                    .then_some(InspectorEvent::ExecutionFinished)
            }
            other => {
                debug!("Ignoring event {}", other);
                None
            }
        }
    }
}

fn decode_event<T: DeserializeOwned>(event: &EventMessage) -> Option<T> {
    match serde_json::from_value(event.params.clone()) {
        Ok(params) => Some(params),
        Err(e) => {
            warn!("Skipping malformed '{}' event: {}", event.method, e);
            None
        }
    }
}

async fn event_loop(mut raw: mpsc::UnboundedReceiver<EventMessage>, shared: Arc<ClientShared>) {
    while let Some(event) = raw.recv().await {
        if let Some(translated) = shared.translate(event).await {
            shared.broadcast(translated);
        }
    }
    info!(
        "Inspector event stream for {} ended",
        shared.connection.endpoint()
    );
    shared.finish();
}

/// Typed client for one inspectable target.
#[derive(Clone)]
pub struct InspectorClient {
    shared: Arc<ClientShared>,
}

impl std::fmt::Debug for InspectorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InspectorClient")
            .field("connection", &self.shared.connection)
            .finish_non_exhaustive()
    }
}

impl InspectorClient {
    /// Connect to the inspector at `endpoint`.
    pub async fn connect(endpoint: &str, config: TransportConfig) -> Result<Self> {
        let connection = Connection::connect(endpoint, config).await?;
        Ok(Self::from_connection(connection))
    }

    /// Build a client on an open connection.
    pub fn from_connection(connection: Connection) -> Self {
        let raw = connection.subscribe_all();
        let shared = Arc::new(ClientShared {
            connection,
            source_maps: RwLock::new(SourceMapRegistry::new()),
            deferred: Mutex::new(HashMap::new()),
            rebound: Mutex::new(HashMap::new()),
            scripts: RwLock::new(HashMap::new()),
            main_context: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
        });
        tokio::spawn(event_loop(raw, shared.clone()));
        Self { shared }
    }

    /// Endpoint of the underlying connection.
    pub fn endpoint(&self) -> &str {
        self.shared.connection.endpoint()
    }

    /// Whether the connection is still open.
    pub fn is_connected(&self) -> bool {
        self.shared.connection.is_connected()
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        self.shared.connection.closed().await;
    }

    /// Close the connection; in-flight calls fail with [`Error::Cancelled`].
    pub async fn close(&self) {
        self.shared.connection.close().await;
    }

    /// Receive typed events.
    ///
    /// A subscriber added after the connection ended immediately receives
    /// [`InspectorEvent::Disconnected`].
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<InspectorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.shared.subscribers.lock();
        if self.shared.disconnected.load(Ordering::SeqCst) {
            let _ = tx.send(InspectorEvent::Disconnected);
        } else {
            subscribers.push(tx);
        }
        rx
    }

    /// URL of a parsed script.
    pub fn script_url(&self, script_id: &str) -> Option<String> {
        self.shared.scripts.read().get(script_id).cloned()
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.shared.connection.send(method, params).await
    }

    async fn call_typed<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| Error::Protocol(format!("Malformed '{method}' response: {e}")))
    }

    // Execution

    /// Enable the Runtime and Debugger domains.
    pub async fn enable(&self) -> Result<()> {
        self.call("Runtime.enable", Value::Null).await?;
        self.call("Debugger.enable", Value::Null).await?;
        Ok(())
    }

    /// Let a target started with `--inspect-brk` begin executing.
    pub async fn run_if_waiting_for_debugger(&self) -> Result<()> {
        self.call("Runtime.runIfWaitingForDebugger", Value::Null)
            .await
            .map(drop)
    }

    /// Request a pause; the pause itself arrives as an event.
    pub async fn pause(&self) -> Result<()> {
        self.call("Debugger.pause", Value::Null).await.map(drop)
    }

    /// Resume execution.
    pub async fn resume(&self) -> Result<()> {
        self.call("Debugger.resume", Value::Null).await.map(drop)
    }

    /// Step over the current statement.
    pub async fn step_over(&self) -> Result<()> {
        self.call("Debugger.stepOver", Value::Null).await.map(drop)
    }

    /// Step into the current call.
    pub async fn step_into(&self) -> Result<()> {
        self.call("Debugger.stepInto", Value::Null).await.map(drop)
    }

    /// Step out of the current function.
    pub async fn step_out(&self) -> Result<()> {
        self.call("Debugger.stepOut", Value::Null).await.map(drop)
    }

    // Breakpoints

    /// Set a breakpoint at a 1-based `line` of `file`.
    ///
    /// `file` may be an absolute path, a URL, or a relative name matched
    /// against the end of script URLs. Original sources with a loaded source
    /// map are translated to the generated script first.
    pub async fn set_breakpoint(
        &self,
        file: &str,
        line: u32,
        condition: Option<&str>,
    ) -> Result<BreakpointPlacement> {
        if line == 0 {
            return Err(Error::InvalidInput(
                "Breakpoint lines are 1-based".to_string(),
            ));
        }

        let (params, mapped) =
            placement_params(&self.shared.source_maps.read(), file, line, condition);
        let result = self.shared.set_by_url(params).await?;
        let locations = self.shared.placement_locations(&result);

        if !mapped && locations.is_empty() {
            self.shared.deferred.lock().insert(
                result.breakpoint_id.clone(),
                DeferredBreakpoint {
                    file: file.to_string(),
                    line,
                    condition: condition.map(str::to_string),
                },
            );
        }

        Ok(BreakpointPlacement {
            protocol_id: result.breakpoint_id,
            locations,
        })
    }

    /// Remove a breakpoint by protocol id.
    pub async fn remove_breakpoint(&self, protocol_id: &str) -> Result<()> {
        self.shared.deferred.lock().remove(protocol_id);
        let current = self
            .shared
            .rebound
            .lock()
            .remove(protocol_id)
            .unwrap_or_else(|| protocol_id.to_string());
        self.call(
            "Debugger.removeBreakpoint",
            json!({ "breakpointId": current }),
        )
        .await
        .map(drop)
    }

    // Runtime

    /// Evaluate an expression in a paused frame.
    pub async fn evaluate_on_frame(
        &self,
        frame_id: &str,
        expression: &str,
    ) -> Result<EvaluationResult> {
        let result: EvaluateResult = self
            .call_typed(
                "Debugger.evaluateOnCallFrame",
                json!({ "callFrameId": frame_id, "expression": expression }),
            )
            .await?;
        Ok(evaluation_result(result))
    }

    /// Evaluate an expression in the global scope.
    pub async fn evaluate(&self, expression: &str) -> Result<EvaluationResult> {
        let result: EvaluateResult = self
            .call_typed("Runtime.evaluate", json!({ "expression": expression }))
            .await?;
        Ok(evaluation_result(result))
    }

    /// Read and clear the error left by a guarded breakpoint condition.
    pub async fn take_condition_error(&self, frame_id: &str) -> Result<Option<String>> {
        let expression = format!(
            "(function(){{var e=globalThis.{g};globalThis.{g}=undefined;return e;}})()",
            g = CONDITION_ERROR_GLOBAL
        );
        let result: EvaluateResult = self
            .call_typed(
                "Debugger.evaluateOnCallFrame",
                json!({ "callFrameId": frame_id, "expression": expression }),
            )
            .await?;
        Ok(match result.result.value {
            Some(Value::String(message)) => Some(message),
            _ => None,
        })
    }

    /// Own properties of a remote object.
    pub async fn get_properties(&self, object_id: &str) -> Result<Vec<Variable>> {
        let result: GetPropertiesResult = self
            .call_typed(
                "Runtime.getProperties",
                json!({ "objectId": object_id, "ownProperties": true }),
            )
            .await?;

        Ok(result
            .result
            .into_iter()
            .map(|prop| match prop.value {
                Some(value) => Variable {
                    name: prop.name,
                    value: value.render(),
                    value_type: value.type_name(),
                    object_id: value.object_id,
                },
                None => Variable {
                    name: prop.name,
                    value: "<accessor>".to_string(),
                    value_type: "accessor".to_string(),
                    object_id: None,
                },
            })
            .collect())
    }

    // Profiling

    /// Start sampling the CPU.
    pub async fn start_cpu_profile(&self) -> Result<()> {
        self.call("Profiler.enable", Value::Null).await?;
        self.call("Profiler.start", Value::Null).await?;
        Ok(())
    }

    /// Stop sampling and return the profile.
    pub async fn stop_cpu_profile(&self) -> Result<CpuProfile> {
        let value = self.call("Profiler.stop", Value::Null).await?;
        let profile = value
            .get("profile")
            .cloned()
            .ok_or_else(|| Error::Protocol("Profiler.stop returned no profile".to_string()))?;

        let count = |key: &str| {
            profile
                .get(key)
                .and_then(Value::as_array)
                .map_or(0, Vec::len)
        };
        let time = |key: &str| profile.get(key).and_then(Value::as_i64).unwrap_or(0);

        Ok(CpuProfile {
            node_count: count("nodes"),
            sample_count: count("samples"),
            duration_us: time("endTime") - time("startTime"),
            profile,
        })
    }

    /// Capture a heap snapshot.
    pub async fn take_heap_snapshot(&self) -> Result<HeapSnapshot> {
        let mut chunks = self
            .shared
            .connection
            .subscribe("HeapProfiler.addHeapSnapshotChunk");
        self.call(
            "HeapProfiler.takeHeapSnapshot",
            json!({ "reportProgress": false }),
        )
        .await?;

        // Chunks are dispatched before the reply is read off the socket.
        let mut data = String::new();
        let mut chunk_count = 0;
        while let Ok(event) = chunks.try_recv() {
            match serde_json::from_value::<HeapSnapshotChunkParams>(event.params) {
                Ok(params) => {
                    data.push_str(&params.chunk);
                    chunk_count += 1;
                }
                Err(e) => warn!("Skipping malformed heap snapshot chunk: {}", e),
            }
        }

        Ok(HeapSnapshot { data, chunk_count })
    }
}

fn evaluation_result(result: EvaluateResult) -> EvaluationResult {
    EvaluationResult {
        value: result.result.render(),
        value_type: result.result.type_name(),
        object_id: result.result.object_id.clone(),
        exception: result.exception_details.map(|d| d.describe()),
    }
}
