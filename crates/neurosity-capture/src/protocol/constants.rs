//! Protocol constants for method names, error codes, and stream names.

/// Known gateway method names.
pub struct Methods;

impl Methods {
    // ─── Authentication ─────────────────────────────────────────────

    /// Exchange device credentials for a session token.
    pub const LOGIN: &'static str = "login";

    // ─── Data Streams ───────────────────────────────────────────────

    /// Subscribe to a device data stream.
    pub const SUBSCRIBE: &'static str = "subscribe";

    /// Unsubscribe from a device data stream.
    pub const UNSUBSCRIBE: &'static str = "unsubscribe";
}

/// Data stream names accepted by the gateway.
pub struct Streams;

impl Streams {
    /// Raw brainwave samples (per-channel microvolt values).
    pub const RAW: &'static str = "raw";
}

/// Gateway JSON-RPC error codes.
pub struct ErrorCodes;

impl ErrorCodes {
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const DEVICE_OFFLINE: i32 = -32001;
    pub const INVALID_SESSION: i32 = -32014;
    pub const INVALID_STREAM: i32 = -32016;
    pub const INVALID_CREDENTIALS: i32 = -32021;
}
