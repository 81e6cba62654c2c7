//! Typed protocol payloads.
//!
//! Field names follow the wire format (camelCase). Line and column numbers in
//! these types are 0-based, exactly as the target sends them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A position inside a parsed script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolLocation {
    /// Script the location belongs to
    pub script_id: String,
    /// 0-based line
    pub line_number: u32,
    /// 0-based column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u32>,
}

/// Mirror of a value living in the target.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    /// Value type (`object`, `number`, `string`, `undefined`, ...)
    #[serde(rename = "type")]
    pub kind: String,
    /// Object subtype (`array`, `null`, `error`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Constructor name for objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Primitive value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Primitive that JSON cannot carry (`NaN`, `-0`, bigint)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unserializable_value: Option<String>,
    /// String representation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Handle for property lookups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

impl RemoteObject {
    /// Render the value as a debugger would show it (strings quoted).
    pub fn render(&self) -> String {
        match &self.value {
            Some(Value::String(s)) => format!("{s:?}"),
            _ => self.render_plain(),
        }
    }

    /// Render the value the way console output prints it (strings bare).
    pub fn render_plain(&self) -> String {
        if let Some(raw) = &self.unserializable_value {
            return raw.clone();
        }
        match &self.value {
            Some(Value::String(s)) => s.clone(),
            Some(other) if self.object_id.is_none() => other.to_string(),
            _ => match (&self.description, self.kind.as_str()) {
                (Some(desc), _) => desc.clone(),
                (None, "undefined") => "undefined".to_string(),
                (None, _) if self.subtype.as_deref() == Some("null") => "null".to_string(),
                (None, kind) => kind.to_string(),
            },
        }
    }

    /// Type shown to callers: the subtype for objects that have one.
    pub fn type_name(&self) -> String {
        match (&self.kind[..], &self.subtype) {
            ("object", Some(subtype)) => subtype.clone(),
            (kind, _) => kind.to_string(),
        }
    }
}

/// One entry of a frame's scope chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeDescriptor {
    /// Scope type (`local`, `closure`, `global`, ...)
    #[serde(rename = "type")]
    pub kind: String,
    /// Object holding the scope's variables
    pub object: RemoteObject,
    /// Scope name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A frame as reported in `Debugger.paused`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolCallFrame {
    /// Frame handle
    pub call_frame_id: String,
    /// Function name
    #[serde(default)]
    pub function_name: String,
    /// Current location
    pub location: ProtocolLocation,
    /// Script URL
    #[serde(default)]
    pub url: String,
    /// Scope chain, innermost first
    #[serde(default)]
    pub scope_chain: Vec<ScopeDescriptor>,
}

/// Payload of `Debugger.paused`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedParams {
    /// Stack, innermost first
    pub call_frames: Vec<ProtocolCallFrame>,
    /// Pause reason (`other`, `exception`, `Break on start`, ...)
    pub reason: String,
    /// Protocol breakpoint ids that caused the pause
    #[serde(default)]
    pub hit_breakpoints: Vec<String>,
    /// Reason-specific data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Result of `Debugger.setBreakpointByUrl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointResult {
    /// Protocol breakpoint id
    pub breakpoint_id: String,
    /// Locations the breakpoint already resolved to
    #[serde(default)]
    pub locations: Vec<ProtocolLocation>,
}

/// Payload of `Debugger.breakpointResolved`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointResolvedParams {
    /// Protocol breakpoint id
    pub breakpoint_id: String,
    /// Resolved location
    pub location: ProtocolLocation,
}

/// Payload of `Debugger.scriptParsed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParsedParams {
    /// Script id
    pub script_id: String,
    /// Script URL (may be empty for eval'd code)
    #[serde(default)]
    pub url: String,
    /// Source map URL, if the script declares one
    #[serde(
        rename = "sourceMapURL",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_map_url: Option<String>,
}

/// Exception details attached to evaluation results and exception events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    /// Short message
    pub text: String,
    /// Thrown value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<RemoteObject>,
    /// 0-based line
    #[serde(default)]
    pub line_number: u32,
    /// 0-based column
    #[serde(default)]
    pub column_number: u32,
    /// Script URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ExceptionDetails {
    /// Best available description: the thrown value's description, else the text.
    pub fn describe(&self) -> String {
        self.exception
            .as_ref()
            .and_then(|e| e.description.clone())
            .unwrap_or_else(|| self.text.clone())
    }
}

/// Result of `Runtime.evaluate` and `Debugger.evaluateOnCallFrame`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
    /// Evaluation result
    pub result: RemoteObject,
    /// Present when the expression threw
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_details: Option<ExceptionDetails>,
}

/// One property returned by `Runtime.getProperties`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    /// Property name
    pub name: String,
    /// Value (absent for accessors)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<RemoteObject>,
}

/// Result of `Runtime.getProperties`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetPropertiesResult {
    /// Own properties
    pub result: Vec<PropertyDescriptor>,
}

/// Payload of `Runtime.consoleAPICalled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleApiCalledParams {
    /// Console method (`log`, `error`, `warn`, ...)
    #[serde(rename = "type")]
    pub kind: String,
    /// Arguments passed to the console call
    #[serde(default)]
    pub args: Vec<RemoteObject>,
}

/// Payload of `Runtime.exceptionThrown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionThrownParams {
    /// Exception details
    pub exception_details: ExceptionDetails,
}

/// Description of an execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContextDescription {
    /// Context id
    pub id: i64,
}

/// Payload of `Runtime.executionContextCreated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContextCreatedParams {
    /// The new context
    pub context: ExecutionContextDescription,
}

/// Payload of `Runtime.executionContextDestroyed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContextDestroyedParams {
    /// Id of the destroyed context
    pub execution_context_id: i64,
}

/// Payload of `HeapProfiler.addHeapSnapshotChunk`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeapSnapshotChunkParams {
    /// Serialized snapshot fragment
    pub chunk: String,
}
