//! TCP calculator demo
//!
//! ```text
//! tcp-calculator serve --bind 127.0.0.1:3000
//! tcp-calculator call --address 127.0.0.1:3000 add 1 2
//! tcp-calculator call --address 127.0.0.1:3000 rpc.methodList
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use linerpc_client::RpcClient;
use linerpc_json_rpc_server::{Dispatcher, HandlerError};
use linerpc_transport::{RpcServer, TcpClientConfig, TcpClientTransport, TcpServerConfig};
use serde_json::{Value, json};
use tracing::info;

#[derive(Parser)]
#[command(name = "tcp-calculator")]
#[command(about = "Serve or call a JSON-RPC calculator over line-delimited TCP")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the calculator server until Ctrl-C
    Serve {
        #[arg(short, long, default_value = "127.0.0.1:3000")]
        bind: SocketAddr,

        /// Bind attempts to repeat while the address is in use
        #[arg(long, default_value = "0")]
        retries: u32,
    },
    /// Call one method and print the result
    Call {
        #[arg(short, long, default_value = "127.0.0.1:3000")]
        address: String,

        /// Request timeout in milliseconds
        #[arg(long, default_value = "5000")]
        timeout_ms: u64,

        method: String,

        /// Positional params, each parsed as JSON (bare words become strings)
        params: Vec<String>,
    },
}

fn number(params: &[Value], index: usize) -> Result<f64, HandlerError> {
    let param = params.get(index).cloned().unwrap_or(Value::Null);
    Ok(serde_json::from_value(param)?)
}

fn calculator() -> Dispatcher {
    let dispatcher = Dispatcher::new();
    dispatcher.register_blocking("add", |params| {
        Ok(json!(number(&params, 0)? + number(&params, 1)?))
    });
    dispatcher.register_blocking("subtract", |params| {
        Ok(json!(number(&params, 0)? - number(&params, 1)?))
    });
    dispatcher.register_callback("divide", 2, |params, done| {
        let result = number(&params, 0).and_then(|a| match number(&params, 1)? {
            b if b == 0.0 => Err(HandlerError::exception("division by zero")),
            b => Ok(json!(a / b)),
        });
        done.complete(result);
    });
    dispatcher.register_promise("sleep", |params| async move {
        let millis = params.first().and_then(Value::as_u64).unwrap_or(100);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(json!(millis))
    });
    dispatcher
}

async fn serve(bind: SocketAddr, retries: u32) -> Result<()> {
    let server = RpcServer::new(Arc::new(calculator()));
    let transport = server
        .listen_tcp(TcpServerConfig::new(bind).with_retries(retries))
        .await
        .with_context(|| format!("failed to listen on {}", bind))?;

    info!(local = ?transport.local_addr(), "Calculator ready; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Stopping calculator");
    server.shutdown().await?;
    Ok(())
}

async fn call(address: String, timeout_ms: u64, method: String, params: Vec<String>) -> Result<()> {
    let config = TcpClientConfig::new(address)
        .with_timeout(Some(Duration::from_millis(timeout_ms)))
        .with_retries(3)
        .with_stop_buffering_after(Some(Duration::from_millis(timeout_ms)));
    let client = RpcClient::builder()
        .with_transport(Arc::new(TcpClientTransport::new(config)))
        .build()?;

    let params = params
        .into_iter()
        .map(|param| serde_json::from_str(&param).unwrap_or(Value::String(param)))
        .collect();

    let result = client.request(&method, params).await;
    client.shutdown().await?;

    let value = result.with_context(|| format!("call to {} failed", method))?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Args::parse().command {
        Command::Serve { bind, retries } => serve(bind, retries).await,
        Command::Call {
            address,
            timeout_ms,
            method,
            params,
        } => call(address, timeout_ms, method, params).await,
    }
}
