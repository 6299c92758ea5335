//! # JSON-RPC Server Prelude
//!
//! Convenient re-exports of the most commonly used dispatch types.
//!
//! ```rust
//! use linerpc_json_rpc_server::prelude::*;
//! ```

pub use crate::dispatch::{Dispatcher, FaultSink, HandlerFault};
pub use crate::error::{JsonRpcErrorCode, JsonRpcErrorObject};
pub use crate::handler::{Completion, Handler, HandlerError, HandlerKind, HandlerResult};
pub use crate::request::JsonRpcRequest;
pub use crate::response::{JsonRpcResponse, ResponseOutcome};
pub use crate::types::RequestId;
pub use crate::{JSONRPC_VERSION, METHOD_LIST};

// Standard error codes
pub use crate::error_codes::*;
