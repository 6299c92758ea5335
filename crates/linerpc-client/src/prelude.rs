//! # Client Prelude
//!
//! ```rust
//! use linerpc_client::prelude::*;
//! ```

// Core client types
pub use crate::client::{MethodProxy, RpcClient, RpcClientBuilder};
pub use crate::config::ClientConfig;
pub use crate::error::{RpcClientError, RpcClientResult};

// Transport types
pub use linerpc_transport::{
    ClientTransport, LoopbackTransport, TcpClientConfig, TcpClientTransport, TransportError,
};

pub use linerpc_json_rpc_server::RequestId;

pub use std::time::Duration;
