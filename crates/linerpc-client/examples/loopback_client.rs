//! In-process client example
//!
//! Serves a dispatcher through the loopback transport and calls it through
//! auto-registered method proxies.

use std::sync::Arc;

use linerpc_client::{RpcClient, RpcClientError};
use linerpc_json_rpc_server::{Dispatcher, HandlerError};
use linerpc_transport::LoopbackTransport;
use serde_json::{Value, json};

#[tokio::main]
async fn main() -> Result<(), RpcClientError> {
    let dispatcher = Dispatcher::new();
    dispatcher.register_blocking("greet", |params| {
        let name = params.first().and_then(Value::as_str).unwrap_or("world");
        Ok(json!(format!("hello, {}", name)))
    });
    dispatcher.register_blocking("reject", |_| {
        Err(HandlerError::payload(json!({"reason": "always rejects"})))
    });

    let client = RpcClient::builder()
        .with_transport(Arc::new(LoopbackTransport::new(Arc::new(dispatcher))))
        .connect()
        .await?;
    println!("methods: {:?}", client.registered_methods());

    let greeting: String = client.method("greet")?.call_as(vec![json!("linerpc")]).await?;
    println!("{}", greeting);

    match client.method("reject")?.call(vec![]).await {
        Err(RpcClientError::ErrorPayload(payload)) => println!("rejected: {}", payload),
        other => println!("unexpected: {:?}", other),
    }

    client.shutdown().await
}
