//! # Capture Pipeline
//!
//! The bounded-duration capture-and-flush pipeline: readings are
//! accumulated from the raw brainwave stream for a fixed wall-clock window,
//! then flushed exactly once to CSV when the window closes.
//!
//! ## Finalization
//!
//! Three triggers can close the window: the duration elapsing naturally, an
//! externally delivered termination request, or an explicit manual stop.
//! Whichever fires first wins; [`FlushController`] guarantees all later
//! triggers are ignored, so the flush happens exactly once no matter how
//! many triggers arrive or how close together.
//!
//! ## Ordering invariant
//!
//! The reading buffer is mutated only by [`Accumulator::ingest`] inside the
//! capture loop and read exactly once by the emitter after the loop has
//! exited and the subscription has been cancelled. An in-flight batch at
//! cancellation time is discarded with the stream — nothing can append to a
//! buffer that is being serialized.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_core::Stream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::client::{DeviceSession, GatewayClient};
use crate::config::CaptureConfig;
use crate::emitter;
use crate::error::CaptureResult;
use crate::protocol::raw::SampleBatch;
use crate::streams::{self, Subscription};

// ─── Readings ────────────────────────────────────────────────────────────

/// A single normalized channel reading.
///
/// `timestamp_ms` is assigned at receipt time (epoch milliseconds), not
/// device time, and is monotonically non-decreasing across the capture.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp_ms: i64,
    pub channel: String,
    pub value: f64,
}

/// Append-only ordered sequence of readings for one capture run.
///
/// Owned by the [`Accumulator`] while the window is open; handed to the
/// CSV emitter exactly once at finalization.
#[derive(Debug, Default)]
pub struct ReadingBuffer {
    readings: Vec<Reading>,
}

impl ReadingBuffer {
    #[must_use]
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Readings in receipt order.
    #[must_use]
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    fn push(&mut self, reading: Reading) {
        self.readings.push(reading);
    }
}

// ─── Accumulator ─────────────────────────────────────────────────────────

/// Buffers incoming sample batches as flat readings.
#[derive(Debug, Default)]
pub struct Accumulator {
    buffer: ReadingBuffer,
    last_timestamp_ms: i64,
}

impl Accumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one reading per well-formed element of the batch, in wire
    /// order, stamped with the receipt time.
    ///
    /// A malformed element (a sample row without a matching channel name,
    /// or a non-numeric/non-finite value) is a data-quality fault: it is
    /// reported with a warning and skipped without aborting ingestion of
    /// the rest of the batch.
    pub fn ingest(&mut self, batch: &SampleBatch) {
        // Clamp against the previous stamp so a system clock step backwards
        // cannot produce a timestamp regression in the buffer.
        let timestamp_ms = receipt_timestamp_ms().max(self.last_timestamp_ms);
        self.last_timestamp_ms = timestamp_ms;

        for (row_idx, row) in batch.samples.iter().enumerate() {
            let Some(channel) = batch.channel_names.get(row_idx) else {
                tracing::warn!(
                    row = row_idx,
                    samples = row.len(),
                    "sample row has no matching channel name; skipping"
                );
                continue;
            };

            for sample in row {
                match sample.as_f64().filter(|v| v.is_finite()) {
                    Some(value) => self.buffer.push(Reading {
                        timestamp_ms,
                        channel: channel.clone(),
                        value,
                    }),
                    None => {
                        tracing::warn!(channel, %sample, "non-numeric sample value; skipping");
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consume the accumulator, yielding the buffer for the emitter.
    #[must_use]
    pub fn into_buffer(self) -> ReadingBuffer {
        self.buffer
    }
}

fn receipt_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

// ─── Flush controller ────────────────────────────────────────────────────

/// Why the capture window closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The bounded duration elapsed naturally.
    DurationElapsed,
    /// An OS termination request (SIGINT and SIGTERM are treated identically).
    Signal,
    /// An explicit manual stop.
    ManualStop,
    /// The gateway stopped delivering before the window closed; treated
    /// like natural completion — whatever was captured is flushed.
    StreamEnded,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::DurationElapsed => write!(f, "duration elapsed"),
            StopReason::Signal => write!(f, "termination signal"),
            StopReason::ManualStop => write!(f, "manual stop"),
            StopReason::StreamEnded => write!(f, "stream ended"),
        }
    }
}

/// Finalization state of a capture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Running,
    Finalizing,
    Done,
}

/// State machine enforcing the single-flush invariant.
///
/// `Running → Finalizing` on the first trigger only; every later trigger of
/// any kind is ignored. `Finalizing → Done` when the emitter completes
/// (success or failure). No transition leads back to `Running`.
#[derive(Debug)]
pub struct FlushController {
    state: ControllerState,
    stop_reason: Option<StopReason>,
}

impl Default for FlushController {
    fn default() -> Self {
        Self::new()
    }
}

impl FlushController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ControllerState::Running,
            stop_reason: None,
        }
    }

    /// Request finalization. Returns `true` for exactly the first trigger;
    /// all later triggers are recorded no-ops.
    pub fn trigger(&mut self, reason: StopReason) -> bool {
        match self.state {
            ControllerState::Running => {
                self.state = ControllerState::Finalizing;
                self.stop_reason = Some(reason);
                tracing::info!(%reason, "finalizing capture");
                true
            }
            ControllerState::Finalizing | ControllerState::Done => {
                tracing::debug!(%reason, "stop trigger ignored; flush already underway");
                false
            }
        }
    }

    /// Mark the emitter as complete. Only meaningful from `Finalizing`.
    pub fn finish(&mut self) {
        if self.state == ControllerState::Finalizing {
            self.state = ControllerState::Done;
        }
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// The trigger that won, once finalization has begun.
    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }
}

// ─── Capture window ──────────────────────────────────────────────────────

/// Summary of a completed capture run.
#[derive(Debug)]
pub struct CaptureReport {
    /// Number of readings written to the CSV file.
    pub rows_written: usize,
    /// The trigger that closed the window.
    pub stop_reason: StopReason,
    /// Wall-clock time from subscription to flush completion.
    pub elapsed: Duration,
}

/// Run the bounded capture window over a live batch stream.
///
/// A single `select!` loop multiplexes batch arrival, the window deadline,
/// and external stop requests. The caller supplies the deadline so it can
/// anchor the window at subscription start rather than loop entry — the
/// subscribe RPC round-trip must not extend the window. On the first
/// trigger the subscription is cancelled (idempotently) and the stream is
/// dropped, discarding any in-flight batch, before the buffer is handed
/// back — so no append can race the flush that follows.
pub async fn run_window<S>(
    mut batches: S,
    subscription: Subscription,
    deadline: Instant,
    mut shutdown_rx: mpsc::Receiver<StopReason>,
    controller: &mut FlushController,
) -> (ReadingBuffer, StopReason)
where
    S: Stream<Item = SampleBatch> + Unpin,
{
    let mut accumulator = Accumulator::new();
    let mut shutdown_open = true;

    let stop_reason = loop {
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => {
                if controller.trigger(StopReason::DurationElapsed) {
                    break StopReason::DurationElapsed;
                }
            }
            requested = shutdown_rx.recv(), if shutdown_open => {
                match requested {
                    Some(reason) => {
                        if controller.trigger(reason) {
                            break reason;
                        }
                    }
                    // Requester went away without stopping us; keep capturing.
                    None => shutdown_open = false,
                }
            }
            batch = batches.next() => {
                match batch {
                    Some(batch) => {
                        tracing::debug!(elements = batch.element_count(), "batch received");
                        accumulator.ingest(&batch);
                    }
                    None => {
                        if controller.trigger(StopReason::StreamEnded) {
                            break StopReason::StreamEnded;
                        }
                    }
                }
            }
        }
    };

    subscription.cancel().await;
    drop(batches);

    let buffer = accumulator.into_buffer();
    tracing::info!(readings = buffer.len(), reason = %stop_reason, "capture window closed");
    (buffer, stop_reason)
}

/// Full capture run: subscribe, accumulate for the configured window, and
/// flush the buffer to the configured CSV path exactly once.
///
/// # Errors
/// Returns subscription errors before any capture happens, and emitter
/// errors after the window has closed. An emitter failure is terminal —
/// the captured data is lost and the error must be surfaced loudly.
pub async fn capture_to_csv(
    client: &Arc<GatewayClient>,
    session: &DeviceSession,
    config: &CaptureConfig,
    shutdown_rx: mpsc::Receiver<StopReason>,
) -> CaptureResult<CaptureReport> {
    let started = Instant::now();
    // The window is anchored here, before the subscribe RPC round-trip.
    let deadline = started + Duration::from_secs(config.duration_secs);

    let (batches, subscription) = streams::subscribe_raw(client, session).await?;
    tracing::info!(
        device = session.device_id(),
        duration_secs = config.duration_secs,
        "capture window open"
    );

    let mut controller = FlushController::new();
    let (buffer, stop_reason) = run_window(
        batches,
        subscription,
        deadline,
        shutdown_rx,
        &mut controller,
    )
    .await;

    let flushed = emitter::flush(&buffer, &config.output_path);
    controller.finish();
    flushed?;

    Ok(CaptureReport {
        rows_written: buffer.len(),
        stop_reason,
        elapsed: started.elapsed(),
    })
}
