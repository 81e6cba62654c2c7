//! Wire message codec.
//!
//! Every frame on the socket is a JSON text message. Requests carry an `id`,
//! a `method` and optional `params`; responses echo the `id` with either a
//! `result` or an `error` object; events carry a `method` and `params` but no
//! `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use inspect_debug_core::{Error, Result};

/// Error object returned by the target in place of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Numeric error code
    pub code: i64,
    /// Human-readable message
    pub message: String,
    /// Extra diagnostic payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<RemoteError> for Error {
    fn from(err: RemoteError) -> Self {
        Error::Remote {
            code: err.code,
            message: err.message,
        }
    }
}

/// Reply to a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Id of the request this answers
    pub id: u64,
    /// Result payload or error object
    pub outcome: std::result::Result<Value, RemoteError>,
}

/// Unsolicited notification from the target.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    /// Event name, e.g. `Debugger.paused`
    pub method: String,
    /// Event payload (`Value::Null` when absent)
    pub params: Value,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// Reply to one of our requests
    Response(Response),
    /// Notification
    Event(EventMessage),
}

/// A decoded request frame, as seen by the receiving end.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMessage {
    /// Request id
    pub id: u64,
    /// Method name
    pub method: String,
    /// Parameters (`Value::Null` when absent)
    pub params: Value,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RemoteError>,
}

#[derive(Serialize)]
struct OutgoingRequest<'a> {
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Value::is_null")]
    params: &'a Value,
}

/// Encode a request frame.
pub fn encode_request(id: u64, method: &str, params: &Value) -> Result<String> {
    Ok(serde_json::to_string(&OutgoingRequest { id, method, params })?)
}

/// Encode a successful response frame.
pub fn encode_response(id: u64, result: &Value) -> Result<String> {
    Ok(serde_json::to_string(&serde_json::json!({
        "id": id,
        "result": result,
    }))?)
}

/// Encode an error response frame.
pub fn encode_error(id: u64, code: i64, message: &str) -> Result<String> {
    Ok(serde_json::to_string(&serde_json::json!({
        "id": id,
        "error": { "code": code, "message": message },
    }))?)
}

/// Encode an event frame.
pub fn encode_event(method: &str, params: &Value) -> Result<String> {
    Ok(serde_json::to_string(&serde_json::json!({
        "method": method,
        "params": params,
    }))?)
}

/// Decode an inbound frame on the client side.
///
/// A frame with an `id` is a response; a frame with only a `method` is an
/// event. Anything else is a protocol error.
pub fn parse_message(text: &str) -> Result<IncomingMessage> {
    let frame: RawFrame = serde_json::from_str(text)
        .map_err(|e| Error::Protocol(format!("Malformed frame: {e}")))?;

    match (frame.id, frame.method) {
        (Some(id), _) if frame.result.is_some() || frame.error.is_some() => {
            let outcome = match frame.error {
                Some(err) => Err(err),
                None => Ok(frame.result.unwrap_or(Value::Null)),
            };
            Ok(IncomingMessage::Response(Response { id, outcome }))
        }
        (None, Some(method)) => Ok(IncomingMessage::Event(EventMessage {
            method,
            params: frame.params.unwrap_or(Value::Null),
        })),
        (Some(id), _) => Err(Error::Protocol(format!(
            "Response {id} has neither result nor error"
        ))),
        (None, None) => Err(Error::Protocol(
            "Frame has neither id nor method".to_string(),
        )),
    }
}

/// Decode an inbound request frame on the serving side.
pub fn parse_request(text: &str) -> Result<RequestMessage> {
    let frame: RawFrame = serde_json::from_str(text)
        .map_err(|e| Error::Protocol(format!("Malformed frame: {e}")))?;

    match (frame.id, frame.method) {
        (Some(id), Some(method)) => Ok(RequestMessage {
            id,
            method,
            params: frame.params.unwrap_or(Value::Null),
        }),
        _ => Err(Error::Protocol("Request needs both id and method".to_string())),
    }
}
