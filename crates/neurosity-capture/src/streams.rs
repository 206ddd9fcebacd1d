//! # Stream Subscription
//!
//! Typed stream adapter plus the raw brainwave subscription used by the
//! capture pipeline.
//!
//! [`subscribe_raw`] registers a stream channel on the client, sends the
//! `subscribe` RPC, and returns a typed batch stream together with a
//! [`Subscription`] handle whose `cancel()` is idempotent.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc;

use crate::client::{DeviceSession, GatewayClient};
use crate::error::{CaptureError, CaptureResult};
use crate::protocol::Streams;
use crate::protocol::raw::{RawEvent, SampleBatch};

/// Pinned, boxed stream of sample batches delivered as they arrive.
pub type BatchStream = Pin<Box<dyn Stream<Item = SampleBatch> + Send>>;

/// Generic stream adapter that receives raw JSON events from an mpsc
/// channel and transforms them into typed values using a parser closure.
///
/// Events that fail to parse are silently skipped (they may be malformed
/// or from an incompatible gateway version).
pub struct TypedStream<T, F>
where
    F: Fn(serde_json::Value) -> Option<T>,
{
    rx: mpsc::Receiver<serde_json::Value>,
    parser: F,
}

impl<T, F> TypedStream<T, F>
where
    F: Fn(serde_json::Value) -> Option<T>,
{
    /// Create a new typed stream from a receiver and a parser function.
    pub fn new(rx: mpsc::Receiver<serde_json::Value>, parser: F) -> Self {
        Self { rx, parser }
    }
}

impl<T, F> Stream for TypedStream<T, F>
where
    T: Send,
    F: Fn(serde_json::Value) -> Option<T> + Unpin + Send,
{
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.rx.poll_recv(cx) {
                Poll::Ready(Some(event)) => {
                    if let Some(parsed) = (self.parser)(event) {
                        return Poll::Ready(Some(parsed));
                    }
                    // Parse failed — skip and try the next event
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

// ─── Subscription handle ─────────────────────────────────────────────────

struct SubscriptionInner {
    client: Arc<GatewayClient>,
    session: DeviceSession,
}

/// Cancellation handle for an active stream subscription.
///
/// [`cancel`](Subscription::cancel) is idempotent: the unsubscribe RPC is
/// sent at most once, and invoking it after natural completion or a prior
/// cancellation is a no-op, not an error.
pub struct Subscription {
    inner: Option<SubscriptionInner>,
    stream: &'static str,
    cancelled: AtomicBool,
}

impl Subscription {
    fn new(client: Arc<GatewayClient>, session: DeviceSession, stream: &'static str) -> Self {
        Self {
            inner: Some(SubscriptionInner { client, session }),
            stream,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Handle with no gateway behind it, for driving the capture loop
    /// without a live connection.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self {
            inner: None,
            stream: Streams::RAW,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Cancel the subscription.
    ///
    /// The first call sends the unsubscribe RPC and removes the stream
    /// channel; every later call returns immediately. A failed unsubscribe
    /// is logged and swallowed — the gateway may already have torn the
    /// stream down after the window closed.
    pub async fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            tracing::debug!(stream = self.stream, "cancel after completion is a no-op");
            return;
        }

        let Some(inner) = &self.inner else { return };

        if let Err(e) = inner
            .client
            .unsubscribe_stream(&inner.session, self.stream)
            .await
        {
            tracing::debug!(
                stream = self.stream,
                error = %e,
                "unsubscribe during cancellation failed"
            );
        }
        inner.client.remove_stream_channel(self.stream);
    }

    /// Whether the subscription has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ─── Raw brainwave subscription ──────────────────────────────────────────

/// Subscribe to the raw brainwave stream for the session's device.
///
/// Returns a push-based stream of [`SampleBatch`] values plus the
/// cancellation handle. The stream is live until the gateway stops
/// delivering or the subscription is cancelled; the caller bounds its
/// duration (see [`capture::run_window`](crate::capture::run_window)).
///
/// # Errors
/// Returns any error produced by stream channel registration or the
/// `subscribe` RPC call.
pub async fn subscribe_raw(
    client: &Arc<GatewayClient>,
    session: &DeviceSession,
) -> CaptureResult<(BatchStream, Subscription)> {
    let rx = client
        .add_stream_channel(Streams::RAW)
        .ok_or_else(|| CaptureError::ProtocolError {
            reason: "Failed to create raw stream channel".into(),
        })?;

    client.subscribe_stream(session, Streams::RAW).await?;

    let stream: BatchStream = Box::pin(TypedStream::new(rx, |event| {
        let raw = event.get(Streams::RAW)?.clone();
        let raw: RawEvent = serde_json::from_value(raw).ok()?;
        Some(SampleBatch::from_raw_event(raw))
    }));

    let subscription = Subscription::new(Arc::clone(client), session.clone(), Streams::RAW);

    Ok((stream, subscription))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_typed_stream_parses_valid_events() {
        let (tx, rx) = mpsc::channel(16);

        let mut stream =
            TypedStream::new(rx, |event| event.get("value")?.as_i64().map(|v| v as i32));

        tx.send(serde_json::json!({"value": 42})).await.unwrap();
        tx.send(serde_json::json!({"value": 99})).await.unwrap();
        drop(tx);

        assert_eq!(stream.next().await, Some(42));
        assert_eq!(stream.next().await, Some(99));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_typed_stream_skips_unparseable_events() {
        let (tx, rx) = mpsc::channel(16);

        let mut stream =
            TypedStream::new(rx, |event| event.get("value")?.as_i64().map(|v| v as i32));

        tx.send(serde_json::json!({"bad": "data"})).await.unwrap();
        tx.send(serde_json::json!({"value": "not_a_number"}))
            .await
            .unwrap();
        tx.send(serde_json::json!({"value": 7})).await.unwrap();
        drop(tx);

        // The first two events should be skipped
        assert_eq!(stream.next().await, Some(7));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_typed_stream_ends_when_sender_dropped() {
        let (tx, rx) = mpsc::channel(16);
        let mut stream = TypedStream::new(rx, |event| event.get("v")?.as_i64().map(|v| v as i32));

        drop(tx);
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_detached_cancel_is_idempotent() {
        let subscription = Subscription::detached();
        assert!(!subscription.is_cancelled());

        for _ in 0..3 {
            subscription.cancel().await;
            assert!(subscription.is_cancelled());
        }
    }

    #[test]
    fn test_raw_event_parser_matches_wire_shape() {
        let parser = |event: serde_json::Value| {
            let raw = event.get(Streams::RAW)?.clone();
            let raw: RawEvent = serde_json::from_value(raw).ok()?;
            Some(SampleBatch::from_raw_event(raw))
        };

        let batch = parser(serde_json::json!({
            "raw": {
                "data": [[1.5, 2.5], [3.5]],
                "info": { "channelNames": ["C3", "C4"] }
            }
        }))
        .unwrap();
        assert_eq!(batch.element_count(), 3);
        assert_eq!(batch.channel_names, vec!["C3", "C4"]);

        // Events for other streams don't parse as raw batches
        assert!(parser(serde_json::json!({"telemetry": {}})).is_none());
    }
}
