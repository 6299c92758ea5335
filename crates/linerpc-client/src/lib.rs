//! # linerpc client
//!
//! The client core of linerpc: it generates correlation ids, builds JSON-RPC
//! 2.0 request envelopes, hands them to any [`ClientTransport`] and turns the
//! raw response into a result or a structured [`RpcClientError`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use linerpc_client::RpcClient;
//! use linerpc_transport::{TcpClientConfig, TcpClientTransport};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = TcpClientTransport::new(TcpClientConfig::new("127.0.0.1:3000"));
//!     let client = RpcClient::builder()
//!         .with_transport(Arc::new(transport))
//!         .connect()
//!         .await?;
//!
//!     let sum: i64 = client.method("add")?.call_as(vec![json!(1), json!(2)]).await?;
//!     println!("1 + 2 = {}", sum);
//!
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod prelude;

pub use client::{IdGenerator, MethodProxy, RpcClient, RpcClientBuilder, interpret_response, sequential_ids};
pub use config::ClientConfig;
pub use error::{RpcClientError, RpcClientResult};

// Re-export transport seam
pub use linerpc_transport::ClientTransport;
