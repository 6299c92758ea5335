//! # JSON-RPC 2.0 Dispatch Engine
//!
//! A transport-agnostic JSON-RPC 2.0 implementation. This crate provides the
//! envelope types, the fixed error taxonomy and the [`Dispatcher`] that turns
//! one decoded JSON value (a single request or a batch array) into a
//! correctly shaped response.
//!
//! ## Features
//! - Batch dispatch with responses collected in completion order
//! - Explicit handler variants: [`Handler::Blocking`], [`Handler::Callback`], [`Handler::Promise`]
//! - Built-in `rpc.methodList` extension method
//! - Synchronous handler faults reported through an injectable fault sink
//!
//! ```rust
//! use linerpc_json_rpc_server::{Dispatcher, HandlerError};
//! use serde_json::json;
//!
//! # futures::executor::block_on(async {
//! let dispatcher = Dispatcher::new();
//! dispatcher.register_blocking("add", |params| {
//!     let a = params.first().and_then(|v| v.as_i64()).unwrap_or(0);
//!     let b = params.get(1).and_then(|v| v.as_i64()).unwrap_or(0);
//!     Ok::<_, HandlerError>(json!(a + b))
//! });
//!
//! let response = dispatcher
//!     .handle(json!({"jsonrpc": "2.0", "method": "add", "params": [2, 3], "id": 1}))
//!     .await;
//! assert_eq!(response["result"], json!(5));
//! # });
//! ```

pub mod dispatch;
pub mod error;
pub mod handler;
pub mod prelude;
pub mod request;
pub mod response;
pub mod types;

// Re-export main types
pub use dispatch::{Dispatcher, FaultSink, HandlerFault};
pub use error::{JsonRpcErrorCode, JsonRpcErrorObject};
pub use handler::{Completion, Handler, HandlerError, HandlerKind, HandlerResult};
pub use request::JsonRpcRequest;
pub use response::{JsonRpcResponse, ResponseOutcome, ResponseShapeError};
pub use types::RequestId;

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Name of the built-in extension method listing every registered method
pub const METHOD_LIST: &str = "rpc.methodList";

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}
