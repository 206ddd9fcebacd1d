//! Device gateway protocol structures.
//!
//! Wire-compatible JSON-RPC structures grouped by concern:
//! - [`rpc`]: JSON-RPC request/response/error envelope types.
//! - [`constants`]: method names, error codes, and stream constants.
//! - [`raw`]: raw brainwave stream events and sample batches.

pub mod constants;
pub mod raw;
pub mod rpc;

pub use constants::{ErrorCodes, Methods, Streams};
pub use raw::{RawEvent, RawInfo, SampleBatch};
pub use rpc::{GatewayRequest, GatewayResponse, RpcError};
