//! # neurosity-capture
//!
//! Bounded-duration raw brainwave capture for Neurosity devices.
//!
//! Authenticates against the device gateway, subscribes to a fixed window
//! of raw brainwave sample batches, accumulates them in memory as flat
//! readings, and flushes them exactly once to a fixed-schema CSV file
//! (`Timestamp,Channel,Value`) when the window closes — whether by the
//! duration elapsing, a termination signal, or a manual stop.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! use neurosity_capture::{CaptureConfig, GatewayClient, capture};
//!
//! #[tokio::main]
//! async fn main() -> neurosity_capture::CaptureResult<()> {
//!     // Load config from environment or neurosity.toml
//!     let config = CaptureConfig::discover(None)?;
//!
//!     let client = Arc::new(GatewayClient::connect(&config).await?);
//!     let session = client
//!         .login(&config.device_id, &config.email, &config.password)
//!         .await?;
//!
//!     // The sender side is for signal handlers / manual stops
//!     let (_shutdown_tx, shutdown_rx) = mpsc::channel(4);
//!     let report = capture::capture_to_csv(&client, &session, &config, shutdown_rx).await?;
//!     println!("captured {} readings ({})", report.rows_written, report.stop_reason);
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See [`CaptureConfig`] for the full configuration reference.
//! The simplest setup uses environment variables:
//!
//! ```bash
//! export NEUROSITY_DEVICE_ID="crown-1234"
//! export NEUROSITY_EMAIL="me@example.com"
//! export NEUROSITY_PASSWORD="..."
//! ```

pub mod capture;
pub mod client;
pub mod config;
pub mod emitter;
pub mod error;
pub mod protocol;
pub mod streams;

// ─── Public re-exports ──────────────────────────────────────────────────

pub use capture::{CaptureReport, FlushController, Reading, ReadingBuffer, StopReason};
pub use client::{DeviceSession, GatewayClient};
pub use config::CaptureConfig;
pub use error::{CaptureError, CaptureResult};
pub use protocol::SampleBatch;
pub use streams::{Subscription, TypedStream};
