//! In-process mock inspector for tests.
//!
//! [`MockInspector`] serves the inspector protocol over a local WebSocket and
//! executes a scripted "program": a list of [`MockStep`]s visited in order.
//! Breakpoints pause at steps whose line is executable in a loaded script,
//! `pause` stops at the current step, and running past the last step ends the
//! program (the main context is destroyed and the socket closed) unless the
//! program is configured to spin forever.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use inspect_debug_core::Result;

use crate::inspector::{unguard_condition, CONDITION_ERROR_GLOBAL};
use crate::launch::{LaunchSpec, LaunchedTarget, Launcher};
use crate::message::{encode_error, encode_event, encode_response, parse_request, RequestMessage};

const MAIN_CONTEXT_ID: i64 = 1;

/// A script the mock target knows about.
#[derive(Debug, Clone)]
pub struct MockScript {
    script_id: String,
    url: String,
    executable_lines: BTreeSet<u32>,
    source_map_url: Option<String>,
    load_after: Option<Duration>,
}

impl MockScript {
    /// A script with the given 0-based executable lines, loaded at startup.
    pub fn new(
        script_id: impl Into<String>,
        url: impl Into<String>,
        executable_lines: impl IntoIterator<Item = u32>,
    ) -> Self {
        Self {
            script_id: script_id.into(),
            url: url.into(),
            executable_lines: executable_lines.into_iter().collect(),
            source_map_url: None,
            load_after: None,
        }
    }

    /// Declare a source map URL in `scriptParsed`.
    pub fn with_source_map(mut self, url: impl Into<String>) -> Self {
        self.source_map_url = Some(url.into());
        self
    }

    /// Load the script this long after the program starts.
    pub fn load_after(mut self, delay: Duration) -> Self {
        self.load_after = Some(delay);
        self
    }
}

/// One statement of the scripted program.
#[derive(Debug, Clone)]
pub struct MockStep {
    url: String,
    line: u32,
    column: u32,
    function_name: String,
}

impl MockStep {
    /// A step at a 0-based `line` of `url`.
    pub fn new(url: impl Into<String>, line: u32, function_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            line,
            column: 0,
            function_name: function_name.into(),
        }
    }

    /// Set the 0-based column.
    pub fn with_column(mut self, column: u32) -> Self {
        self.column = column;
        self
    }
}

/// How the mock evaluates a breakpoint condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCondition {
    /// Condition yields this value
    Value(bool),
    /// Condition throws this message
    Throws(String),
}

/// Behaviour of a [`MockInspector`].
#[derive(Debug, Clone, Default)]
pub struct MockInspectorConfig {
    scripts: Vec<MockScript>,
    program: Vec<MockStep>,
    break_on_start: bool,
    loop_forever: bool,
    advance_on_pause: bool,
    exit_after: Option<Duration>,
    console: Vec<(String, String)>,
    console_delay: Option<Duration>,
    evaluations: HashMap<String, Value>,
    properties: HashMap<String, Value>,
    conditions: HashMap<String, MockCondition>,
    failing_methods: HashMap<String, String>,
    silent_methods: HashSet<String>,
    method_delays: HashMap<String, Duration>,
}

impl MockInspectorConfig {
    /// Add a script.
    pub fn with_script(mut self, script: MockScript) -> Self {
        self.scripts.push(script);
        self
    }

    /// Set the program's steps.
    pub fn with_program(mut self, steps: impl IntoIterator<Item = MockStep>) -> Self {
        self.program = steps.into_iter().collect();
        self
    }

    /// Pause with reason `Break on start` when the program starts.
    pub fn with_break_on_start(mut self, enabled: bool) -> Self {
        self.break_on_start = enabled;
        self
    }

    /// Spin at the last step forever instead of exiting.
    pub fn with_loop_forever(mut self, enabled: bool) -> Self {
        self.loop_forever = enabled;
        self
    }

    /// Move to the next step (wrapping) on every `pause`, like a busy program.
    pub fn with_advance_on_pause(mut self, enabled: bool) -> Self {
        self.advance_on_pause = enabled;
        self
    }

    /// End the program this long after it starts.
    pub fn with_exit_after(mut self, delay: Duration) -> Self {
        self.exit_after = Some(delay);
        self
    }

    /// Emit a console call of `kind` when the program starts.
    pub fn with_console(mut self, kind: impl Into<String>, text: impl Into<String>) -> Self {
        self.console.push((kind.into(), text.into()));
        self
    }

    /// Emit the console calls `delay` after the program starts.
    pub fn with_console_delay(mut self, delay: Duration) -> Self {
        self.console_delay = Some(delay);
        self
    }

    /// Result object returned when evaluating `expression`.
    pub fn with_evaluation(mut self, expression: impl Into<String>, result: Value) -> Self {
        self.evaluations.insert(expression.into(), result);
        self
    }

    /// Property descriptors returned for `object_id`.
    pub fn with_properties(mut self, object_id: impl Into<String>, descriptors: Value) -> Self {
        self.properties.insert(object_id.into(), descriptors);
        self
    }

    /// Outcome of a breakpoint condition.
    pub fn with_condition(mut self, condition: impl Into<String>, outcome: MockCondition) -> Self {
        self.conditions.insert(condition.into(), outcome);
        self
    }

    /// Answer `method` with an error.
    pub fn with_failing_method(
        mut self,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.failing_methods.insert(method.into(), message.into());
        self
    }

    /// Never answer `method`.
    pub fn with_silent_method(mut self, method: impl Into<String>) -> Self {
        self.silent_methods.insert(method.into());
        self
    }

    /// Answer `method` only after `delay`.
    pub fn with_method_delay(mut self, method: impl Into<String>, delay: Duration) -> Self {
        self.method_delays.insert(method.into(), delay);
        self
    }
}

#[derive(Debug)]
struct MockBreakpoint {
    id: String,
    url: Option<String>,
    url_regex: Option<Regex>,
    line: u32,
    condition: Option<String>,
}

impl MockBreakpoint {
    fn matches_url(&self, url: &str) -> bool {
        match (&self.url, &self.url_regex) {
            (Some(u), _) => u == url,
            (None, Some(re)) => re.is_match(url),
            (None, None) => false,
        }
    }
}

#[derive(Debug, Default)]
struct Runtime {
    started: bool,
    paused: bool,
    finished: bool,
    position: usize,
    loaded: HashSet<String>,
    breakpoints: Vec<MockBreakpoint>,
    condition_error: Option<String>,
    received: Vec<(u64, String)>,
}

struct Shared {
    config: MockInspectorConfig,
    runtime: Mutex<Runtime>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    connection: Mutex<Option<CancellationToken>>,
    shutdown: CancellationToken,
}

#[derive(Clone)]
struct Ctx {
    shared: Arc<Shared>,
    out: mpsc::UnboundedSender<Message>,
    conn: CancellationToken,
}

impl Ctx {
    fn config(&self) -> &MockInspectorConfig {
        &self.shared.config
    }

    fn send(&self, text: Result<String>) {
        match text {
            Ok(text) => {
                let _ = self.out.send(Message::Text(text));
            }
            Err(e) => warn!("Mock failed to encode frame: {}", e),
        }
    }

    fn reply(&self, id: u64, result: Value) {
        self.send(encode_response(id, &result));
    }

    fn error(&self, id: u64, code: i64, message: &str) {
        self.send(encode_error(id, code, message));
    }

    fn emit(&self, method: &str, params: Value) {
        self.send(encode_event(method, &params));
    }

    fn script_for(&self, url: &str) -> Option<&MockScript> {
        self.config().scripts.iter().find(|s| s.url == url)
    }

    fn is_resolved(&self, rt: &Runtime, url: &str, line: u32) -> bool {
        self.script_for(url).is_some_and(|s| {
            rt.loaded.contains(&s.script_id) && s.executable_lines.contains(&line)
        })
    }

    fn frames(&self, position: usize) -> Value {
        let Some(step) = self.config().program.get(position) else {
            return json!([]);
        };
        let script_id = self
            .script_for(&step.url)
            .map(|s| s.script_id.clone())
            .unwrap_or_default();
        json!([
            {
                "callFrameId": "frame:0",
                "functionName": step.function_name,
                "location": {
                    "scriptId": script_id,
                    "lineNumber": step.line,
                    "columnNumber": step.column,
                },
                "url": step.url,
                "scopeChain": [
                    { "type": "local", "object": { "type": "object", "objectId": format!("scope:local:{position}") } },
                    { "type": "global", "object": { "type": "object", "objectId": "scope:global" } },
                ],
            },
            {
                "callFrameId": "frame:1",
                "functionName": "",
                "location": { "scriptId": script_id, "lineNumber": 0, "columnNumber": 0 },
                "url": step.url,
                "scopeChain": [
                    { "type": "global", "object": { "type": "object", "objectId": "scope:global" } },
                ],
            },
        ])
    }

    fn pause_at(&self, rt: &mut Runtime, position: usize, reason: &str, hits: Vec<String>) {
        rt.position = position;
        rt.paused = true;
        self.emit(
            "Debugger.paused",
            json!({
                "callFrames": self.frames(position),
                "reason": reason,
                "hitBreakpoints": hits,
            }),
        );
    }

    fn condition_passes(&self, rt: &mut Runtime, condition: &str) -> bool {
        let raw = unguard_condition(condition);
        match self.config().conditions.get(raw.unwrap_or(condition)) {
            Some(MockCondition::Value(value)) => *value,
            Some(MockCondition::Throws(message)) => {
                // Only the guarded form turns a throw into a pause.
                if raw.is_some() {
                    rt.condition_error = Some(message.clone());
                    true
                } else {
                    false
                }
            }
            None => true,
        }
    }

    fn hits_at(&self, rt: &mut Runtime, position: usize) -> Vec<String> {
        let Some(step) = self.config().program.get(position) else {
            return vec![];
        };
        if !self.is_resolved(rt, &step.url, step.line) {
            return vec![];
        }

        let candidates: Vec<(String, Option<String>)> = rt
            .breakpoints
            .iter()
            .filter(|bp| bp.line == step.line && bp.matches_url(&step.url))
            .map(|bp| (bp.id.clone(), bp.condition.clone()))
            .collect();

        candidates
            .into_iter()
            .filter(|(_, condition)| match condition {
                Some(c) => self.condition_passes(rt, c),
                None => true,
            })
            .map(|(id, _)| id)
            .collect()
    }

    fn run_from(&self, rt: &mut Runtime, from: usize) {
        let len = self.config().program.len();
        for position in from..len {
            let hits = self.hits_at(rt, position);
            if !hits.is_empty() {
                self.pause_at(rt, position, "other", hits);
                return;
            }
        }
        if self.config().loop_forever && len > 0 {
            // A busy program keeps cycling from where it was interrupted.
            if !self.config().advance_on_pause {
                rt.position = len - 1;
            }
        } else {
            self.finish(rt);
        }
    }

    fn finish(&self, rt: &mut Runtime) {
        if rt.finished {
            return;
        }
        debug!("Mock program finished");
        rt.finished = true;
        rt.paused = false;
        self.emit(
            "Runtime.executionContextDestroyed",
            json!({ "executionContextId": MAIN_CONTEXT_ID }),
        );
        let _ = self.out.send(Message::Close(None));
        self.conn.cancel();
    }

    fn load_script(&self, rt: &mut Runtime, script: &MockScript) {
        rt.loaded.insert(script.script_id.clone());
        let mut params = json!({ "scriptId": script.script_id, "url": script.url });
        if let Some(map) = &script.source_map_url {
            params["sourceMapURL"] = json!(map);
        }
        self.emit("Debugger.scriptParsed", params);

        for bp in rt.breakpoints.iter().filter(|bp| bp.matches_url(&script.url)) {
            if script.executable_lines.contains(&bp.line) {
                self.emit(
                    "Debugger.breakpointResolved",
                    json!({
                        "breakpointId": bp.id,
                        "location": {
                            "scriptId": script.script_id,
                            "lineNumber": bp.line,
                            "columnNumber": 0,
                        },
                    }),
                );
            }
        }
    }

    fn emit_console(&self) {
        for (kind, text) in &self.config().console {
            self.emit(
                "Runtime.consoleAPICalled",
                json!({
                    "type": kind,
                    "args": [{ "type": "string", "value": text }],
                    "executionContextId": MAIN_CONTEXT_ID,
                    "timestamp": 0,
                }),
            );
        }
    }

    fn start(&self, rt: &mut Runtime) {
        if rt.started {
            return;
        }
        rt.started = true;

        match self.config().console_delay {
            Some(delay) => {
                let ctx = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let rt = ctx.shared.runtime.lock();
                    if !rt.finished {
                        ctx.emit_console();
                    }
                });
            }
            None => self.emit_console(),
        }

        for script in self.config().scripts.iter().filter(|s| s.load_after.is_some()) {
            let ctx = self.clone();
            let script = script.clone();
            let delay = script.load_after.unwrap_or_default();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let mut rt = ctx.shared.runtime.lock();
                if !rt.finished {
                    ctx.load_script(&mut rt, &script);
                }
            });
        }

        if let Some(delay) = self.config().exit_after {
            let ctx = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let mut rt = ctx.shared.runtime.lock();
                ctx.finish(&mut rt);
            });
        }

        if self.config().break_on_start && !self.config().program.is_empty() {
            self.pause_at(rt, 0, "Break on start", vec![]);
        } else {
            self.run_from(rt, 0);
        }
    }

    fn set_breakpoint(&self, rt: &mut Runtime, id: u64, params: &Value) {
        let line = params["lineNumber"].as_u64().unwrap_or(0) as u32;
        let url = params["url"].as_str().map(str::to_string);
        let url_regex = match params["urlRegex"].as_str() {
            Some(pattern) => match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => return self.error(id, -32602, &format!("Invalid urlRegex: {e}")),
            },
            None => None,
        };
        if url.is_none() && url_regex.is_none() {
            return self.error(id, -32602, "Either url or urlRegex must be specified.");
        }

        let key = url
            .clone()
            .or_else(|| url_regex.as_ref().map(|re| re.as_str().to_string()))
            .unwrap_or_default();
        let bp_id = format!("{line}:0:0:{key}");
        if rt.breakpoints.iter().any(|bp| bp.id == bp_id) {
            return self.error(id, -32000, "Breakpoint at specified location already exists.");
        }

        let bp = MockBreakpoint {
            id: bp_id.clone(),
            url,
            url_regex,
            line,
            condition: params["condition"].as_str().map(str::to_string),
        };
        let locations: Vec<Value> = self
            .config()
            .scripts
            .iter()
            .filter(|s| {
                rt.loaded.contains(&s.script_id)
                    && bp.matches_url(&s.url)
                    && s.executable_lines.contains(&line)
            })
            .map(|s| json!({ "scriptId": s.script_id, "lineNumber": line, "columnNumber": 0 }))
            .collect();
        rt.breakpoints.push(bp);

        self.reply(id, json!({ "breakpointId": bp_id, "locations": locations }));
    }

    fn evaluate(&self, rt: &mut Runtime, id: u64, expression: &str) {
        if expression.contains(CONDITION_ERROR_GLOBAL) {
            let result = match rt.condition_error.take() {
                Some(message) => json!({ "type": "string", "value": message }),
                None => json!({ "type": "undefined" }),
            };
            return self.reply(id, json!({ "result": result }));
        }

        match self.config().evaluations.get(expression) {
            Some(result) => self.reply(id, json!({ "result": result })),
            None => {
                let description = format!("ReferenceError: {expression} is not defined");
                let exception = json!({
                    "type": "object",
                    "subtype": "error",
                    "className": "ReferenceError",
                    "description": description,
                    "objectId": "exception:1",
                });
                self.reply(
                    id,
                    json!({
                        "result": exception,
                        "exceptionDetails": {
                            "exceptionId": 1,
                            "text": "Uncaught",
                            "lineNumber": 0,
                            "columnNumber": 0,
                            "exception": exception,
                        },
                    }),
                );
            }
        }
    }

    fn dispatch(&self, req: RequestMessage) {
        let mut rt = self.shared.runtime.lock();
        let id = req.id;

        match req.method.as_str() {
            "Runtime.enable" => {
                self.reply(id, json!({}));
                self.emit(
                    "Runtime.executionContextCreated",
                    json!({ "context": { "id": MAIN_CONTEXT_ID, "origin": "", "name": "main" } }),
                );
            }
            "Debugger.enable" => {
                self.reply(id, json!({ "debuggerId": "mock-debugger" }));
                let initial: Vec<MockScript> = self
                    .config()
                    .scripts
                    .iter()
                    .filter(|s| s.load_after.is_none())
                    .cloned()
                    .collect();
                for script in &initial {
                    self.load_script(&mut rt, script);
                }
            }
            "Runtime.runIfWaitingForDebugger" => {
                self.reply(id, json!({}));
                self.start(&mut rt);
            }
            "Debugger.setBreakpointByUrl" => self.set_breakpoint(&mut rt, id, &req.params),
            "Debugger.removeBreakpoint" => {
                let bp_id = req.params["breakpointId"].as_str().unwrap_or_default();
                let before = rt.breakpoints.len();
                rt.breakpoints.retain(|bp| bp.id != bp_id);
                if rt.breakpoints.len() == before {
                    self.error(id, -32000, &format!("Breakpoint with id {bp_id} not found"));
                } else {
                    self.reply(id, json!({}));
                }
            }
            "Debugger.resume" => {
                if !rt.paused {
                    return self.error(id, -32000, "Can only perform operation while paused.");
                }
                self.reply(id, json!({}));
                rt.paused = false;
                self.emit("Debugger.resumed", json!({}));
                let next = rt.position + 1;
                self.run_from(&mut rt, next);
            }
            "Debugger.pause" => {
                self.reply(id, json!({}));
                if !rt.paused && !rt.finished {
                    let len = self.config().program.len();
                    if self.config().advance_on_pause && rt.started && len > 0 {
                        rt.position = (rt.position + 1) % len;
                    }
                    let position = rt.position;
                    self.pause_at(&mut rt, position, "other", vec![]);
                }
            }
            "Debugger.stepOver" | "Debugger.stepInto" | "Debugger.stepOut" => {
                if !rt.paused {
                    return self.error(id, -32000, "Can only perform operation while paused.");
                }
                self.reply(id, json!({}));
                rt.paused = false;
                self.emit("Debugger.resumed", json!({}));
                let next = rt.position + 1;
                if next < self.config().program.len() {
                    self.pause_at(&mut rt, next, "other", vec![]);
                } else if self.config().loop_forever {
                    let position = rt.position;
                    self.pause_at(&mut rt, position, "other", vec![]);
                } else {
                    self.finish(&mut rt);
                }
            }
            "Debugger.evaluateOnCallFrame" | "Runtime.evaluate" => {
                let expression = req.params["expression"].as_str().unwrap_or_default();
                self.evaluate(&mut rt, id, expression);
            }
            "Runtime.getProperties" => {
                let object_id = req.params["objectId"].as_str().unwrap_or_default();
                let result = self
                    .config()
                    .properties
                    .get(object_id)
                    .cloned()
                    .unwrap_or_else(|| json!([]));
                self.reply(id, json!({ "result": result }));
            }
            "Profiler.enable" | "Profiler.disable" | "Profiler.start" | "HeapProfiler.enable" => {
                self.reply(id, json!({}));
            }
            "Profiler.stop" => self.reply(
                id,
                json!({
                    "profile": {
                        "nodes": [
                            { "id": 1, "callFrame": { "functionName": "(root)", "scriptId": "0", "url": "", "lineNumber": -1, "columnNumber": -1 }, "children": [2] },
                            { "id": 2, "callFrame": { "functionName": "main", "scriptId": "1", "url": "", "lineNumber": 0, "columnNumber": 0 } },
                        ],
                        "startTime": 1000,
                        "endTime": 2500,
                        "samples": [2, 2, 1],
                        "timeDeltas": [500, 500, 500],
                    }
                }),
            ),
            "HeapProfiler.takeHeapSnapshot" => {
                self.emit(
                    "HeapProfiler.addHeapSnapshotChunk",
                    json!({ "chunk": "{\"snapshot\":{\"node_count\":1}," }),
                );
                self.emit(
                    "HeapProfiler.addHeapSnapshotChunk",
                    json!({ "chunk": "\"nodes\":[]}" }),
                );
                self.reply(id, json!({}));
            }
            other => self.error(id, -32601, &format!("'{other}' wasn't found")),
        }
    }

    fn handle(&self, req: RequestMessage) {
        self.shared
            .runtime
            .lock()
            .received
            .push((req.id, req.method.clone()));

        let config = self.config();
        if config.silent_methods.contains(&req.method) {
            return;
        }
        if let Some(message) = config.failing_methods.get(&req.method) {
            return self.error(req.id, -32000, message);
        }
        if let Some(delay) = config.method_delays.get(&req.method).copied() {
            let ctx = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                ctx.dispatch(req);
            });
            return;
        }
        self.dispatch(req);
    }
}

/// A mock inspectable target listening on a local port.
pub struct MockInspector {
    addr: SocketAddr,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MockInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockInspector")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl MockInspector {
    /// Start serving on an ephemeral local port.
    pub async fn spawn(config: MockInspectorConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let shared = Arc::new(Shared {
            config,
            runtime: Mutex::new(Runtime::default()),
            outgoing: Mutex::new(None),
            connection: Mutex::new(None),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(accept_loop(listener, shared.clone()));
        debug!("Mock inspector listening on {}", addr);
        Ok(Self { addr, shared })
    }

    /// WebSocket endpoint to connect to.
    pub fn endpoint(&self) -> String {
        format!("ws://{}/mock", self.addr)
    }

    /// Methods received so far, in order.
    pub fn received_methods(&self) -> Vec<String> {
        self.shared
            .runtime
            .lock()
            .received
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Request ids received so far, in order.
    pub fn received_ids(&self) -> Vec<u64> {
        self.shared
            .runtime
            .lock()
            .received
            .iter()
            .map(|(id, _)| *id)
            .collect()
    }

    /// Whether the program is currently paused.
    pub fn is_paused(&self) -> bool {
        self.shared.runtime.lock().paused
    }

    /// Whether the program ran to completion.
    pub fn is_finished(&self) -> bool {
        self.shared.runtime.lock().finished
    }

    /// Number of breakpoints currently installed.
    pub fn breakpoint_count(&self) -> usize {
        self.shared.runtime.lock().breakpoints.len()
    }

    /// Send a raw text frame to the connected client.
    pub fn send_raw(&self, text: &str) {
        if let Some(out) = self.shared.outgoing.lock().as_ref() {
            let _ = out.send(Message::Text(text.to_string()));
        }
    }

    /// Drop the client's socket without a close handshake.
    pub fn disconnect(&self) {
        if let Some(conn) = self.shared.connection.lock().take() {
            conn.cancel();
        }
        self.shared.outgoing.lock().take();
    }
}

impl Drop for MockInspector {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        let accepted = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                debug!("Mock inspector accepted {}", peer);
                tokio::spawn(serve_connection(stream, shared.clone()));
            }
            Err(e) => {
                warn!("Mock inspector accept failed: {}", e);
                break;
            }
        }
    }
}

async fn serve_connection(stream: TcpStream, shared: Arc<Shared>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("Mock inspector handshake failed: {}", e);
            return;
        }
    };
    let (mut sink, mut source) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    let conn = shared.shutdown.child_token();

    *shared.outgoing.lock() = Some(out_tx.clone());
    *shared.connection.lock() = Some(conn.clone());

    let writer_conn = conn.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                msg = out_rx.recv() => match msg {
                    Some(msg) => {
                        let closing = matches!(msg, Message::Close(_));
                        if sink.send(msg).await.is_err() || closing {
                            break;
                        }
                    }
                    None => break,
                },
                _ = writer_conn.cancelled() => break,
            }
        }
    });

    let ctx = Ctx {
        shared,
        out: out_tx,
        conn: conn.clone(),
    };

    loop {
        let frame = tokio::select! {
            _ = conn.cancelled() => break,
            frame = source.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(text))) => match parse_request(&text) {
                Ok(req) => ctx.handle(req),
                Err(e) => warn!("Mock inspector ignoring frame: {}", e),
            },
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
            Some(Ok(_)) => {}
        }
    }

    conn.cancel();
    let _ = writer.await;
    debug!("Mock inspector connection closed");
}

/// Launcher that starts a fresh [`MockInspector`] per launch.
#[derive(Debug)]
pub struct MockLauncher {
    config: MockInspectorConfig,
    launched: Mutex<Vec<MockInspector>>,
}

impl MockLauncher {
    /// Launch mocks configured with `config`.
    pub fn new(config: MockInspectorConfig) -> Self {
        Self {
            config,
            launched: Mutex::new(Vec::new()),
        }
    }

    /// Number of launches so far.
    pub fn launch_count(&self) -> usize {
        self.launched.lock().len()
    }
}

#[async_trait]
impl Launcher for MockLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedTarget> {
        debug!("Mock launching {}", spec.program);
        let mock = MockInspector::spawn(self.config.clone()).await?;
        let endpoint = mock.endpoint();
        self.launched.lock().push(mock);
        Ok(LaunchedTarget {
            endpoint,
            process: None,
        })
    }
}
