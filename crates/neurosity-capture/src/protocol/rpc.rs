//! JSON-RPC request/response protocol structures.

use serde::{Deserialize, Serialize};

/// A JSON-RPC 2.0 request to the device gateway.
#[derive(Debug, Serialize)]
pub struct GatewayRequest {
    pub id: u64,
    pub jsonrpc: &'static str,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl GatewayRequest {
    /// Create a new request with the given method and params.
    ///
    /// Empty object params are omitted entirely from the serialized request.
    pub fn new(id: u64, method: &'static str, params: serde_json::Value) -> Self {
        let params = if params.as_object().is_some_and(serde_json::Map::is_empty) {
            None
        } else {
            Some(params)
        };

        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// A JSON-RPC 2.0 response from the device gateway.
#[derive(Debug, Deserialize)]
pub struct GatewayResponse {
    pub id: Option<u64>,
    pub result: Option<serde_json::Value>,
    pub error: Option<RpcError>,
}

/// A JSON-RPC 2.0 error payload from the device gateway.
///
/// This is the raw error object from the protocol. Use
/// [`CaptureError::from_api_error`](crate::CaptureError::from_api_error)
/// to convert to a semantic error type.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Gateway API error {}: {}", self.code, self.message)
    }
}
