//! # Gateway WebSocket JSON-RPC Client
//!
//! Low-level transport for communicating with the Neurosity device gateway.
//! Handles WebSocket connection, JSON-RPC request/response correlation, and
//! the login flow.
//!
//! ## Architecture
//!
//! The WebSocket connection is split into reader/writer halves using
//! `tokio-tungstenite`'s `StreamExt::split()`. This allows API calls to be
//! made concurrently with data streaming on the same WebSocket:
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 GatewayClient                    │
//! │                                                  │
//! │  writer: Arc<Mutex<SplitSink>>  ◄── call()       │
//! │                                                  │
//! │  reader_loop (spawned task):                     │
//! │    SplitStream ─┬─► RPC response → oneshot tx    │
//! │                 └─► raw event    → raw_tx        │
//! └─────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::config::CaptureConfig;
use crate::error::{CaptureError, CaptureResult};
use crate::protocol::rpc::{GatewayRequest, GatewayResponse};
use crate::protocol::{Methods, Streams};

/// Connection timeout for the initial WebSocket handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Channel buffer size for data stream events. The stream itself makes no
/// buffering guarantee: if a consumer falls behind, `try_send` drops the
/// overflowing batches.
const STREAM_CHANNEL_BUFFER: usize = 1024;

/// Type alias for the write half of the WebSocket connection.
type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Type alias for the read half of the WebSocket connection.
type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// A pending RPC response awaiting its matching JSON-RPC response by `id`.
type PendingResponse = oneshot::Sender<CaptureResult<serde_json::Value>>;

/// Senders for dispatching stream data events to consumers, keyed by
/// stream name.
type StreamSenders = HashMap<&'static str, mpsc::Sender<serde_json::Value>>;

/// Opaque authenticated device handle returned by [`GatewayClient::login`].
///
/// Owned exclusively by the capture run; the session is invalidated when
/// the process exits.
#[derive(Debug, Clone)]
pub struct DeviceSession {
    token: String,
    device_id: String,
}

impl DeviceSession {
    /// Device this session is bound to.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }
}

/// WebSocket JSON-RPC client for the Neurosity device gateway.
///
/// The client manages a single WebSocket connection, split into reader and
/// writer halves. The writer is shared (behind `Arc<Mutex>`) so that API
/// calls can be made concurrently with data streaming. The reader runs in a
/// background task that dispatches:
///
/// - **RPC responses** → matched by `id` to pending `oneshot` channels
/// - **Data events** → routed by stream name to `mpsc` channels
pub struct GatewayClient {
    /// Shared write half of the WebSocket.
    writer: Arc<Mutex<WsWriter>>,

    /// Map of pending RPC requests awaiting responses, keyed by request ID.
    pending_responses: Arc<Mutex<HashMap<u64, PendingResponse>>>,

    /// Auto-incrementing request ID counter.
    next_id: AtomicU64,

    /// Handle to the background reader loop task.
    reader_handle: std::sync::Mutex<Option<JoinHandle<()>>>,

    /// Whether the reader loop is currently running.
    reader_running: Arc<AtomicBool>,

    /// Shared stream senders. The reader holds a clone of this Arc and
    /// checks it on each data message.
    stream_senders: Arc<std::sync::Mutex<Option<StreamSenders>>>,

    /// RPC call timeout (from config).
    rpc_timeout: Duration,
}

impl GatewayClient {
    /// Connect to the device gateway WebSocket service.
    pub async fn connect(config: &CaptureConfig) -> CaptureResult<Self> {
        let url = &config.gateway_url;
        let rpc_timeout = Duration::from_secs(config.rpc_timeout_secs);

        let (ws, response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str()))
            .await
            .map_err(|_| CaptureError::Timeout {
                seconds: CONNECT_TIMEOUT.as_secs(),
            })?
            .map_err(|e| CaptureError::ConnectionFailed {
                url: url.clone(),
                reason: format!("WebSocket connection failed: {}", e),
            })?;

        tracing::info!(url, status = %response.status(), "Connected to device gateway");

        // Split the WebSocket into reader and writer halves.
        let (writer, reader) = ws.split();

        let pending_responses: Arc<Mutex<HashMap<u64, PendingResponse>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let reader_running = Arc::new(AtomicBool::new(true));
        let stream_senders: Arc<std::sync::Mutex<Option<StreamSenders>>> =
            Arc::new(std::sync::Mutex::new(None));

        // Start the reader loop immediately — it needs to be running before
        // any API calls so that responses can be dispatched.
        let reader_handle = Self::spawn_reader_loop(
            reader,
            Arc::clone(&pending_responses),
            Arc::clone(&reader_running),
            Arc::clone(&stream_senders),
        );

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            pending_responses,
            next_id: AtomicU64::new(1),
            reader_handle: std::sync::Mutex::new(Some(reader_handle)),
            reader_running,
            stream_senders,
            rpc_timeout,
        })
    }

    /// Spawn the background reader loop that dispatches WebSocket messages.
    fn spawn_reader_loop(
        mut reader: WsReader,
        pending_responses: Arc<Mutex<HashMap<u64, PendingResponse>>>,
        running: Arc<AtomicBool>,
        stream_senders: Arc<std::sync::Mutex<Option<StreamSenders>>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                let msg = tokio::select! {
                    msg = reader.next() => msg,
                    () = tokio::time::sleep(Duration::from_millis(100)) => continue,
                };

                match msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::trace!(raw = %text, "Reader loop received message");

                        let value: serde_json::Value = match serde_json::from_str(&text) {
                            Ok(v) => v,
                            Err(e) => {
                                tracing::warn!("Failed to parse WebSocket message as JSON: {}", e);
                                continue;
                            }
                        };

                        // RPC responses carry an `id` field
                        if let Some(id) = value.get("id").and_then(serde_json::Value::as_u64) {
                            let response: std::result::Result<GatewayResponse, _> =
                                serde_json::from_value(value);

                            let mut pending = pending_responses.lock().await;
                            if let Some(tx) = pending.remove(&id) {
                                match response {
                                    Ok(resp) => {
                                        let result = if let Some(error) = resp.error {
                                            tracing::error!(
                                                id,
                                                code = error.code,
                                                message = %error.message,
                                                "Gateway API error in RPC response",
                                            );
                                            Err(CaptureError::from_api_error(
                                                error.code,
                                                error.message,
                                            ))
                                        } else {
                                            resp.result.ok_or_else(|| {
                                                CaptureError::ProtocolError {
                                                    reason: "Response has no result or error"
                                                        .into(),
                                                }
                                            })
                                        };
                                        let _ = tx.send(result);
                                    }
                                    Err(e) => {
                                        let _ = tx.send(Err(CaptureError::ProtocolError {
                                            reason: format!("Failed to parse RPC response: {}", e),
                                        }));
                                    }
                                }
                            } else {
                                tracing::debug!(id, "Received response for unknown request ID");
                            }
                            continue;
                        }

                        // Not an RPC response — route as a stream data event.
                        if let Ok(guard) = stream_senders.lock() {
                            if let Some(ref senders) = *guard {
                                for (key, tx) in senders.iter() {
                                    if value.get(*key).is_some() {
                                        let _ = tx.try_send(value);
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("Gateway WebSocket closed by server");
                        let mut pending = pending_responses.lock().await;
                        for (_, tx) in pending.drain() {
                            let _ = tx.send(Err(CaptureError::ConnectionLost {
                                reason: "Gateway WebSocket closed".into(),
                            }));
                        }
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket read error: {}", e);
                        let mut pending = pending_responses.lock().await;
                        for (_, tx) in pending.drain() {
                            let _ = tx.send(Err(CaptureError::WebSocket(format!(
                                "WebSocket error: {}",
                                e
                            ))));
                        }
                        break;
                    }
                    None => {
                        tracing::info!("Gateway WebSocket stream ended");
                        break;
                    }
                    _ => {
                        // Binary messages, pings, pongs — skip
                    }
                }
            }

            tracing::debug!("Reader loop exiting");
            running.store(false, Ordering::SeqCst);

            // With no sender left, subscribed streams end instead of
            // hanging their consumers.
            if let Ok(mut guard) = stream_senders.lock() {
                *guard = None;
            }
        })
    }

    // ─── Core RPC ───────────────────────────────────────────────────────

    /// Send a JSON-RPC request and wait for the matching response.
    async fn call(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> CaptureResult<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = GatewayRequest::new(id, method, params);

        let json = serde_json::to_string(&request).map_err(|e| CaptureError::ProtocolError {
            reason: format!("serialize error: {}", e),
        })?;

        tracing::debug!(method, id, "Sending gateway request");

        // Register the pending response before sending
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending_responses.lock().await;
            pending.insert(id, tx);
        }

        // Send the request via the shared writer
        {
            let mut writer = self.writer.lock().await;
            writer
                .send(Message::Text(json.into()))
                .await
                .map_err(|e| CaptureError::WebSocket(format!("Send error: {}", e)))?;
        }

        // Wait for the reader loop to deliver the response
        let timeout_secs = self.rpc_timeout.as_secs();
        let result = tokio::time::timeout(self.rpc_timeout, rx)
            .await
            .map_err(|_| {
                // Clean up the pending entry on timeout
                let pending = self.pending_responses.clone();
                tokio::spawn(async move {
                    pending.lock().await.remove(&id);
                });
                CaptureError::Timeout {
                    seconds: timeout_secs,
                }
            })?
            .map_err(|_| CaptureError::ConnectionLost {
                reason: "Response channel dropped (reader loop died)".into(),
            })??;

        tracing::debug!(method, id, "Gateway RPC succeeded");
        Ok(result)
    }

    // ─── Authentication ─────────────────────────────────────────────────

    /// Authenticate against the device gateway.
    ///
    /// Exchanges credentials for a [`DeviceSession`]. Invalid credentials,
    /// an unreachable device, or a network timeout all abort the run — no
    /// retry is performed.
    pub async fn login(
        &self,
        device_id: &str,
        email: &str,
        password: &str,
    ) -> CaptureResult<DeviceSession> {
        let result = self
            .call(
                Methods::LOGIN,
                serde_json::json!({
                    "deviceId": device_id,
                    "email": email,
                    "password": password,
                }),
            )
            .await?;

        let token = result
            .get("sessionToken")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CaptureError::ProtocolError {
                reason: "login response missing sessionToken".into(),
            })?
            .to_string();

        tracing::info!(device = device_id, "Authenticated with device gateway");

        Ok(DeviceSession {
            token,
            device_id: device_id.to_string(),
        })
    }

    // ─── Streaming ──────────────────────────────────────────────────────

    /// Stream name validation and mapping to static keys.
    fn stream_key(name: &str) -> &'static str {
        match name {
            Streams::RAW => "raw",
            other => {
                tracing::warn!(stream = other, "Unknown stream type");
                "unknown"
            }
        }
    }

    /// Add a stream channel without disturbing existing ones.
    ///
    /// Returns a receiver for the new channel, or `None` if the sender map
    /// mutex is poisoned (should never happen in practice).
    pub fn add_stream_channel(&self, stream: &str) -> Option<mpsc::Receiver<serde_json::Value>> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_BUFFER);
        if let Ok(mut guard) = self.stream_senders.lock() {
            let senders = guard.get_or_insert_with(StreamSenders::new);
            senders.insert(Self::stream_key(stream), tx);
            Some(rx)
        } else {
            None
        }
    }

    /// Remove a stream channel sender.
    pub fn remove_stream_channel(&self, stream: &str) {
        if let Ok(mut guard) = self.stream_senders.lock() {
            if let Some(ref mut senders) = *guard {
                senders.remove(stream);
            }
        }
    }

    /// Subscribe to a device data stream.
    pub async fn subscribe_stream(
        &self,
        session: &DeviceSession,
        stream: &str,
    ) -> CaptureResult<serde_json::Value> {
        let result = self
            .call(
                Methods::SUBSCRIBE,
                serde_json::json!({
                    "sessionToken": session.token(),
                    "deviceId": session.device_id(),
                    "stream": stream,
                }),
            )
            .await?;

        tracing::info!(stream, "Subscribed to device stream");
        Ok(result)
    }

    /// Unsubscribe from a device data stream.
    pub async fn unsubscribe_stream(
        &self,
        session: &DeviceSession,
        stream: &str,
    ) -> CaptureResult<()> {
        self.call(
            Methods::UNSUBSCRIBE,
            serde_json::json!({
                "sessionToken": session.token(),
                "deviceId": session.device_id(),
                "stream": stream,
            }),
        )
        .await?;

        tracing::info!(stream, "Unsubscribed from device stream");
        Ok(())
    }

    // ─── Shutdown ───────────────────────────────────────────────────────

    /// Close the WebSocket connection and stop the reader loop.
    pub async fn disconnect(&self) {
        self.reader_running.store(false, Ordering::SeqCst);

        {
            let mut writer = self.writer.lock().await;
            let _ = writer.close().await;
        }

        let handle = self
            .reader_handle
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
        }
    }
}
