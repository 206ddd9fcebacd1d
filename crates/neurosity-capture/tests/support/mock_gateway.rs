#![allow(dead_code)]

//! In-process WebSocket gateway for driving the client and capture
//! pipeline in tests. Each accepted connection exposes the requests the
//! client sent and lets the test script responses and pushed stream
//! events.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

pub const STEP_TIMEOUT: Duration = Duration::from_secs(3);

/// Route client/library tracing into the test harness (enable with
/// `RUST_LOG`). Safe to call from every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct MockConnection {
    request_rx: mpsc::Receiver<Value>,
    outgoing_tx: mpsc::Sender<Value>,
}

impl MockConnection {
    pub async fn recv_request(&mut self) -> Value {
        timeout(STEP_TIMEOUT, self.request_rx.recv())
            .await
            .expect("timed out waiting for request")
            .expect("mock connection request channel closed")
    }

    /// Receive the next request, asserting its JSON-RPC method.
    pub async fn recv_request_method(&mut self, expected_method: &str) -> Value {
        let request = self.recv_request().await;
        let method = request.get("method").and_then(Value::as_str);
        assert_eq!(method, Some(expected_method), "unexpected method request");
        request
    }

    /// Receive the next request if one arrives within `wait`.
    pub async fn try_recv_request(&mut self, wait: Duration) -> Option<Value> {
        match timeout(wait, self.request_rx.recv()).await {
            Ok(Some(request)) => Some(request),
            _ => None,
        }
    }

    pub async fn send_json(&self, value: Value) {
        self.outgoing_tx
            .send(value)
            .await
            .expect("failed to send to mock connection");
    }

    pub async fn send_result(&self, id: u64, result: Value) {
        self.send_json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": result,
        }))
        .await;
    }

    pub async fn send_error(&self, id: u64, code: i32, message: &str) {
        self.send_json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": code,
                "message": message,
            }
        }))
        .await;
    }

    /// Push a raw brainwave stream event with one sample row per channel.
    pub async fn push_raw_event(&self, channels: &[&str], rows: &[&[f64]]) {
        assert_eq!(channels.len(), rows.len(), "one row per channel expected");
        self.send_json(json!({
            "raw": {
                "data": rows,
                "info": {
                    "channelNames": channels,
                    "startTime": 1_700_000_000.0,
                }
            }
        }))
        .await;
    }
}

pub struct MockGatewayServer {
    addr: SocketAddr,
    connection_rx: mpsc::Receiver<MockConnection>,
    server_task: JoinHandle<()>,
}

impl MockGatewayServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        let (connection_tx, connection_rx) = mpsc::channel(16);

        let server_task = tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => break,
                };

                let connection_tx = connection_tx.clone();
                tokio::spawn(async move {
                    let ws_stream = match accept_async(stream).await {
                        Ok(ws) => ws,
                        Err(_) => return,
                    };

                    let (mut ws_sink, mut ws_source) = ws_stream.split();
                    let (request_tx, request_rx) = mpsc::channel(64);
                    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Value>(64);

                    let connection = MockConnection {
                        request_rx,
                        outgoing_tx,
                    };

                    if connection_tx.send(connection).await.is_err() {
                        return;
                    }

                    loop {
                        tokio::select! {
                            maybe_outgoing = outgoing_rx.recv() => {
                                match maybe_outgoing {
                                    Some(value) => {
                                        let message = Message::Text(value.to_string().into());
                                        if ws_sink.send(message).await.is_err() {
                                            break;
                                        }
                                    }
                                    None => break,
                                }
                            }
                            maybe_message = ws_source.next() => {
                                match maybe_message {
                                    Some(Ok(Message::Text(text))) => {
                                        if let Ok(value) = serde_json::from_str::<Value>(&text) {
                                            let _ = request_tx.send(value).await;
                                        }
                                    }
                                    Some(Ok(Message::Close(_))) => break,
                                    Some(Ok(_)) => {}
                                    Some(Err(_)) => break,
                                    None => break,
                                }
                            }
                        }
                    }
                });
            }
        });

        Ok(Self {
            addr,
            connection_rx,
            server_task,
        })
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn accept_connection(&mut self) -> MockConnection {
        timeout(STEP_TIMEOUT, self.connection_rx.recv())
            .await
            .expect("timed out waiting for client connection")
            .expect("mock server connection channel closed")
    }
}

impl Drop for MockGatewayServer {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}
