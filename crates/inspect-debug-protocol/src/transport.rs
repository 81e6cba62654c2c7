//! Request/response transport over a WebSocket connection.
//!
//! One [`Connection`] talks to exactly one inspectable target. Requests are
//! correlated with responses by a per-connection id; events are dispatched to
//! explicit subscriber channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use inspect_debug_core::{millis, Error, Result, TransportSettings};

use crate::message::{encode_request, parse_message, EventMessage, IncomingMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;
type PendingReply = oneshot::Sender<Result<Value>>;

/// Runtime transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Timeout for the WebSocket handshake
    pub connect_timeout: Duration,
    /// Default timeout for each request
    pub request_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from(&TransportSettings::default())
    }
}

impl From<&TransportSettings> for TransportConfig {
    fn from(settings: &TransportSettings) -> Self {
        Self {
            connect_timeout: settings.connect_timeout(),
            request_timeout: settings.request_timeout(),
        }
    }
}

struct Subscriber {
    /// `None` receives every event
    filter: Option<String>,
    tx: mpsc::UnboundedSender<EventMessage>,
}

impl Subscriber {
    fn wants(&self, method: &str) -> bool {
        self.filter.as_deref().map_or(true, |f| f == method)
    }
}

struct Inner {
    endpoint: String,
    writer: tokio::sync::Mutex<Option<WsSink>>,
    pending: Mutex<HashMap<u64, PendingReply>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    connected: AtomicBool,
    shutdown: CancellationToken,
    config: TransportConfig,
}

impl Inner {
    fn remove_pending(&self, id: u64) {
        self.pending.lock().remove(&id);
    }

    fn fail_pending(&self, make_err: impl Fn() -> Error) {
        let pending = std::mem::take(&mut *self.pending.lock());
        if !pending.is_empty() {
            debug!("Failing {} in-flight requests on {}", pending.len(), self.endpoint);
        }
        for (_id, tx) in pending {
            let _ = tx.send(Err(make_err()));
        }
    }

    fn dispatch(&self, event: EventMessage) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sub| {
            if sub.wants(&event.method) {
                sub.tx.send(event.clone()).is_ok()
            } else {
                !sub.tx.is_closed()
            }
        });
    }

    fn resolve(&self, id: u64, outcome: Result<Value>) {
        let tx = self.pending.lock().remove(&id);
        match tx {
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => warn!("Dropping response for unknown request id {}", id),
        }
    }
}

/// A connection to one inspectable target.
///
/// Cloning is cheap; all clones share the same socket.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.inner.endpoint)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Open a WebSocket connection to `endpoint`.
    pub async fn connect(endpoint: &str, config: TransportConfig) -> Result<Self> {
        info!("Connecting to inspector at {}", endpoint);

        let (stream, _response) =
            tokio::time::timeout(config.connect_timeout, connect_async(endpoint))
                .await
                .map_err(|_| {
                    error!("Timed out connecting to {}", endpoint);
                    Error::Connection(format!(
                        "Timed out connecting to {endpoint} after {}ms",
                        config.connect_timeout.as_millis()
                    ))
                })?
                .map_err(|e| {
                    error!("Failed to connect to {}: {}", endpoint, e);
                    Error::Connection(format!("Failed to connect to {endpoint}: {e}"))
                })?;

        let (sink, source) = stream.split();
        let inner = Arc::new(Inner {
            endpoint: endpoint.to_string(),
            writer: tokio::sync::Mutex::new(Some(sink)),
            pending: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(true),
            shutdown: CancellationToken::new(),
            config,
        });

        tokio::spawn(read_loop(source, inner.clone()));

        debug!("Connected to {}", endpoint);
        Ok(Self { inner })
    }

    /// Endpoint this connection was opened against.
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Whether the socket is still open.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Send a request and wait for its response using the default timeout.
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.send_with_timeout(method, params, self.inner.config.request_timeout)
            .await
    }

    /// Send a request and wait for its response for at most `timeout`.
    ///
    /// On timeout the pending entry is removed, so a late response is dropped.
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let text = encode_request(id, method, &params)?;
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id, tx);

        debug!("--> {} {}", id, method);
        {
            let mut writer = self.inner.writer.lock().await;
            let Some(sink) = writer.as_mut() else {
                self.inner.remove_pending(id);
                return Err(Error::NotConnected);
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                self.inner.remove_pending(id);
                warn!("Failed to send '{}' to {}: {}", method, self.inner.endpoint, e);
                return Err(Error::Connection(format!("Failed to send '{method}': {e}")));
            }
        }

        tokio::select! {
            biased;
            res = tokio::time::timeout(timeout, rx) => match res {
                Ok(Ok(outcome)) => {
                    debug!("<-- {} {}", id, method);
                    outcome
                }
                Ok(Err(_closed)) => Err(Error::Cancelled),
                Err(_elapsed) => {
                    self.inner.remove_pending(id);
                    warn!("Request {} '{}' timed out after {}ms", id, method, timeout.as_millis());
                    Err(Error::Timeout {
                        method: method.to_string(),
                        timeout_ms: millis(timeout),
                    })
                }
            },
            _ = self.inner.shutdown.cancelled() => {
                self.inner.remove_pending(id);
                Err(Error::Cancelled)
            }
        }
    }

    /// Receive every event named `method`.
    ///
    /// The stream ends when the connection closes.
    pub fn subscribe(&self, method: &str) -> mpsc::UnboundedReceiver<EventMessage> {
        self.add_subscriber(Some(method.to_string()))
    }

    /// Receive every event.
    pub fn subscribe_all(&self) -> mpsc::UnboundedReceiver<EventMessage> {
        self.add_subscriber(None)
    }

    fn add_subscriber(&self, filter: Option<String>) -> mpsc::UnboundedReceiver<EventMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.inner.subscribers.lock();
        // The read loop clears the list under this lock once it stops, so a
        // late subscriber must not be added after that point.
        if self.is_connected() {
            subscribers.push(Subscriber { filter, tx });
        }
        rx
    }

    /// Resolves once the connection is closed, locally or by the remote end.
    pub async fn closed(&self) {
        self.inner.shutdown.cancelled().await;
    }

    /// Close the connection.
    ///
    /// In-flight requests fail with [`Error::Cancelled`] and every subscriber
    /// stream ends. Calling this again is a no-op.
    pub async fn close(&self) {
        if !self.inner.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Closing connection to {}", self.inner.endpoint);

        self.inner.shutdown.cancel();
        self.inner.fail_pending(|| Error::Cancelled);
        self.inner.subscribers.lock().clear();

        let sink = self.inner.writer.lock().await.take();
        if let Some(mut sink) = sink {
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        }
    }
}

async fn read_loop(mut source: WsSource, inner: Arc<Inner>) {
    let remote_reason = loop {
        let frame = tokio::select! {
            _ = inner.shutdown.cancelled() => break None,
            frame = source.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => handle_text(&inner, &text),
            Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                Ok(text) => handle_text(&inner, text),
                Err(_) => warn!("Dropping non-UTF-8 binary frame from {}", inner.endpoint),
            },
            Some(Ok(Message::Close(_))) | None => {
                break Some("connection closed by remote".to_string());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break Some(format!("connection lost: {e}")),
        }
    };

    let was_connected = inner.connected.swap(false, Ordering::SeqCst);
    inner.shutdown.cancel();

    if let Some(reason) = remote_reason {
        if was_connected {
            warn!("Inspector at {} disconnected: {}", inner.endpoint, reason);
        }
        inner.fail_pending(|| Error::Connection(reason.clone()));
        inner.writer.lock().await.take();
    }

    inner.subscribers.lock().clear();
    debug!("Read loop for {} stopped", inner.endpoint);
}

fn handle_text(inner: &Inner, text: &str) {
    match parse_message(text) {
        Ok(IncomingMessage::Response(resp)) => {
            let outcome = resp.outcome.map_err(Error::from);
            inner.resolve(resp.id, outcome);
        }
        Ok(IncomingMessage::Event(event)) => {
            debug!("<-- event {}", event.method);
            inner.dispatch(event);
        }
        Err(e) => warn!("Skipping frame from {}: {}", inner.endpoint, e),
    }
}
