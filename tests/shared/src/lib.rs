//! Shared helpers for linerpc integration tests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use linerpc_client::RpcClient;
use linerpc_json_rpc_server::{Dispatcher, HandlerError};
use linerpc_transport::{
    RpcServer, TcpClientConfig, TcpClientTransport, TcpServerConfig, TcpServerTransport,
    TransportEvent, EventReceiver,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Install a test subscriber honouring `RUST_LOG`; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A loopback address whose port was free a moment ago
pub async fn unused_local_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    listener.local_addr().expect("local addr")
}

fn int(params: &[Value], index: usize) -> Result<i64, HandlerError> {
    params
        .get(index)
        .and_then(Value::as_i64)
        .ok_or_else(|| HandlerError::exception(format!("param {} must be an integer", index)))
}

/// Dispatcher with one method of every handler kind plus failure cases
///
/// - `add(a, b)`: blocking
/// - `double(n)`: callback declaring one param
/// - `delay(ms, value)`: promise resolving after `ms`
/// - `explode()`: exception error
/// - `custom_error()`: verbatim error payload `{"foo": "x"}`
/// - `panic_sync()`: callback that panics synchronously
pub fn calculator_dispatcher() -> Dispatcher {
    let dispatcher = Dispatcher::new();
    dispatcher.register_blocking("add", |params| Ok(json!(int(&params, 0)? + int(&params, 1)?)));
    dispatcher.register_callback("double", 1, |params, done| {
        done.complete(int(&params, 0).map(|n| json!(n * 2)));
    });
    dispatcher.register_promise("delay", |params| async move {
        let millis = params.first().and_then(Value::as_u64).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(params.get(1).cloned().unwrap_or(Value::Null))
    });
    dispatcher.register_blocking("explode", |_| Err(HandlerError::exception("it blew up")));
    dispatcher.register_blocking("custom_error", |_| Err(HandlerError::payload(json!({"foo": "x"}))));
    dispatcher.register_callback("panic_sync", 0, |_, _| panic!("synchronous failure"));
    dispatcher
}

/// Server host with the calculator bound to an ephemeral port
pub async fn start_calculator() -> (RpcServer, Arc<TcpServerTransport>, SocketAddr) {
    let server = RpcServer::new(Arc::new(calculator_dispatcher()));
    let transport = server
        .listen_tcp(TcpServerConfig::default())
        .await
        .expect("start calculator server");
    let addr = transport.local_addr().expect("bound address");
    (server, transport, addr)
}

/// Client over TCP with short timings suited to tests
pub fn tcp_client_config(addr: SocketAddr) -> TcpClientConfig {
    TcpClientConfig::new(addr.to_string())
        .with_timeout(Some(Duration::from_secs(5)))
        .with_retry_interval(Duration::from_millis(25))
}

pub async fn tcp_client(config: TcpClientConfig) -> RpcClient {
    RpcClient::builder()
        .with_transport(Arc::new(TcpClientTransport::new(config)))
        .connect()
        .await
        .expect("build client")
}

/// Wait for the first event matching `predicate`, failing after five seconds
pub async fn wait_for_event<F>(events: &mut EventReceiver, mut predicate: F) -> TransportEvent
where
    F: FnMut(&TransportEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel open");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for transport event")
}
