//! # Error Types
//!
//! Semantic error types for the capture pipeline. Every variant carries
//! enough context to diagnose the problem without digging through logs.
//!
//! ## Error Code Mapping
//!
//! The device gateway returns numeric error codes in JSON-RPC error
//! responses. [`CaptureError::from_api_error`] maps known codes to semantic
//! variants with actionable error messages.

use thiserror::Error;

use crate::protocol::constants::ErrorCodes;

/// Convenient Result alias for capture operations.
pub type CaptureResult<T> = std::result::Result<T, CaptureError>;

/// All errors that can occur during a capture run.
#[derive(Error, Debug)]
pub enum CaptureError {
    // ─── Connection ─────────────────────────────────────────────────
    /// Failed to establish a WebSocket connection to the device gateway.
    #[error("Failed to connect to device gateway at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// WebSocket connection was lost after being established.
    #[error("Connection to device gateway lost: {reason}")]
    ConnectionLost { reason: String },

    /// The client is not connected to the gateway.
    #[error("Not connected to the device gateway")]
    NotConnected,

    // ─── Authentication ─────────────────────────────────────────────
    /// Login failed (invalid email/password or rejected device pairing).
    #[error("Authentication failed: {reason}. Check your Neurosity account email and password.")]
    AuthenticationFailed { reason: String },

    /// The device is not reachable through the gateway.
    #[error("Device {device_id} is offline. Ensure it is powered on and connected to the network.")]
    DeviceOffline { device_id: String },

    // ─── Streams ────────────────────────────────────────────────────
    /// Subscribe/unsubscribe failed for the requested stream.
    #[error("Stream error: {reason}")]
    StreamError { reason: String },

    // ─── API ────────────────────────────────────────────────────────
    /// Raw gateway error that doesn't map to a more specific variant.
    #[error("Gateway API error {code}: {message}")]
    ApiError { code: i32, message: String },

    /// The requested API method was not found (likely a version mismatch).
    #[error("API method not found: {method}")]
    MethodNotFound { method: String },

    // ─── Timeout ────────────────────────────────────────────────────
    /// An operation timed out waiting for a response.
    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    // ─── Protocol ───────────────────────────────────────────────────
    /// Received an unexpected or malformed message from the gateway.
    #[error("Protocol error: {reason}")]
    ProtocolError { reason: String },

    // ─── Config ─────────────────────────────────────────────────────
    /// Configuration error (missing credentials, malformed file, or invalid values).
    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    // ─── WebSocket ──────────────────────────────────────────────────
    /// Low-level WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    // ─── I/O ────────────────────────────────────────────────────────
    /// Filesystem or I/O error (config file reading, CSV flushing, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization error at flush time.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CaptureError {
    /// Map a gateway API error code + message to the most specific variant.
    ///
    /// Known gateway error codes:
    /// - `-32601`: Method not found
    /// - `-32001`: Device offline
    /// - `-32014`: Invalid session token
    /// - `-32016`: Invalid stream
    /// - `-32021`: Invalid credentials
    pub fn from_api_error(code: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            ErrorCodes::METHOD_NOT_FOUND => CaptureError::MethodNotFound { method: message },
            ErrorCodes::DEVICE_OFFLINE => CaptureError::DeviceOffline { device_id: message },
            ErrorCodes::INVALID_SESSION | ErrorCodes::INVALID_CREDENTIALS => {
                CaptureError::AuthenticationFailed { reason: message }
            }
            ErrorCodes::INVALID_STREAM => CaptureError::StreamError { reason: message },
            _ => CaptureError::ApiError { code, message },
        }
    }

    /// Returns `true` if this error means authentication can never succeed
    /// for the current run (credentials, device reachability, or timeout).
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            CaptureError::AuthenticationFailed { .. }
                | CaptureError::DeviceOffline { .. }
                | CaptureError::Timeout { .. }
        )
    }
}

// ─── From impls for external error types ────────────────────────────────

impl From<tokio_tungstenite::tungstenite::Error> for CaptureError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        CaptureError::WebSocket(err.to_string())
    }
}

impl From<toml::de::Error> for CaptureError {
    fn from(err: toml::de::Error) -> Self {
        CaptureError::ConfigError {
            reason: err.to_string(),
        }
    }
}
