//! TCP server transport: accepts connections and feeds decoded frames to a handler

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::StreamExt;
use linerpc_json_rpc_server::JsonRpcResponse;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::codec::{DecodedFrame, JsonLineCodec, encode_frame};
use crate::config::TcpServerConfig;
use crate::error::{TransportError, TransportResult};
use crate::events::{EventBus, EventReceiver, TransportEvent};
use crate::transport::{MessageHandler, ResponseWriter};

#[derive(Debug)]
struct ConnectionEntry {
    peer: SocketAddr,
    token: CancellationToken,
}

struct ServerShared {
    events: EventBus,
    shutdown: CancellationToken,
    connections: Mutex<HashMap<u64, ConnectionEntry>>,
    next_connection: AtomicU64,
    tracker: TaskTracker,
    max_frame_bytes: Option<usize>,
}

/// Line-delimited JSON server over TCP
pub struct TcpServerTransport {
    config: TcpServerConfig,
    shared: Arc<ServerShared>,
    local_addr: Mutex<Option<SocketAddr>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl TcpServerTransport {
    pub fn new(config: TcpServerConfig) -> Self {
        let shared = Arc::new(ServerShared {
            events: EventBus::new(),
            shutdown: CancellationToken::new(),
            connections: Mutex::new(HashMap::new()),
            next_connection: AtomicU64::new(1),
            tracker: TaskTracker::new(),
            max_frame_bytes: config.max_frame_bytes,
        });
        Self {
            config,
            shared,
            local_addr: Mutex::new(None),
            accept_task: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &TcpServerConfig {
        &self.config
    }

    /// Subscribe to lifecycle events; subscribe before `start` to observe bind retries
    pub fn events(&self) -> EventReceiver {
        self.shared.events.subscribe()
    }

    /// Address the listener is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn connection_count(&self) -> usize {
        self.shared.connections.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.local_addr().is_some() && !self.shared.shutdown.is_cancelled()
    }

    /// Bind the configured address and start accepting connections.
    ///
    /// Returns the bound address, which differs from the configured one when
    /// port 0 was requested.
    pub async fn start(&self, handler: Arc<dyn MessageHandler>) -> TransportResult<SocketAddr> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Shutdown);
        }
        if let Some(local) = self.local_addr() {
            debug!(%local, "TCP server already started");
            return Ok(local);
        }

        let listener = self.bind_with_retry().await?;
        let local = listener.local_addr()?;
        *self.local_addr.lock() = Some(local);

        info!(%local, "TCP server listening");
        self.shared.events.emit(TransportEvent::Listening { local });

        let task = tokio::spawn(accept_loop(listener, handler, self.shared.clone()));
        *self.accept_task.lock() = Some(task);
        Ok(local)
    }

    async fn bind_with_retry(&self) -> TransportResult<TcpListener> {
        let address = self.config.bind_address;
        let mut attempt = 0;
        loop {
            match TcpListener::bind(address).await {
                Ok(listener) => return Ok(listener),
                Err(e) if e.kind() == ErrorKind::AddrInUse && attempt < self.config.retries => {
                    attempt += 1;
                    warn!(%address, attempt, error = %e, "Address in use; retrying bind");
                    self.shared.events.emit(TransportEvent::Retry {
                        attempt,
                        error: e.to_string(),
                    });
                    tokio::select! {
                        biased;
                        _ = self.shared.shutdown.cancelled() => return Err(TransportError::Shutdown),
                        _ = tokio::time::sleep(self.config.retry_interval) => {}
                    }
                }
                Err(e) => {
                    error!(%address, error = %e, "Failed to bind TCP server");
                    self.shared.events.emit(TransportEvent::BindFailed {
                        error: e.to_string(),
                    });
                    return Err(TransportError::Bind { address, source: e });
                }
            }
        }
    }

    /// Stop accepting, close every open connection and wait for them to finish
    pub async fn shutdown(&self) -> TransportResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!(local = ?self.local_addr(), "Shutting down TCP server transport");

        self.shared.shutdown.cancel();
        let connections: Vec<_> = self.shared.connections.lock().drain().collect();
        for (_, connection) in connections {
            debug!(peer = %connection.peer, "Closing connection");
            connection.token.cancel();
        }

        let task = self.accept_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Accept loop ended abnormally");
            }
        }
        self.shared.tracker.close();
        self.shared.tracker.wait().await;

        self.shared.events.emit(TransportEvent::Shutdown);
        Ok(())
    }
}

impl Drop for TcpServerTransport {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: Arc<dyn MessageHandler>,
    shared: Arc<ServerShared>,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                let id = shared.next_connection.fetch_add(1, Ordering::Relaxed);
                let token = shared.shutdown.child_token();
                shared.connections.lock().insert(
                    id,
                    ConnectionEntry {
                        peer,
                        token: token.clone(),
                    },
                );
                debug!(%peer, connection = id, "Accepted connection");
                shared.events.emit(TransportEvent::ConnectionOpened { peer });

                shared.tracker.spawn(serve_connection(
                    stream,
                    peer,
                    id,
                    token,
                    handler.clone(),
                    shared.clone(),
                ));
            }
            Err(e) => warn!(error = %e, "Failed to accept connection"),
        }
    }
    debug!("Accept loop stopped");
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    id: u64,
    token: CancellationToken,
    handler: Arc<dyn MessageHandler>,
    shared: Arc<ServerShared>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut frames = FramedRead::new(reader, JsonLineCodec::with_max_frame_bytes(shared.max_frame_bytes));
    let (responder, mut responses) = ResponseWriter::channel();
    // Dropped once the peer stops sending; the loop then drains in-flight responses
    let mut responder = Some(responder);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            response = responses.recv() => {
                let Some(response) = response else {
                    break;
                };
                match encode_frame(&response) {
                    Ok(frame) => {
                        if let Err(e) = writer.write_all(&frame).await {
                            debug!(%peer, error = %e, "Failed to write response");
                            break;
                        }
                    }
                    Err(e) => warn!(%peer, error = %e, "Failed to encode response"),
                }
            }
            inbound = frames.next(), if responder.is_some() => {
                let Some(current) = responder.as_ref() else {
                    continue;
                };
                match inbound {
                    Some(Ok(DecodedFrame::Message(message))) => {
                        let handler = handler.clone();
                        let responder = current.clone();
                        tokio::spawn(async move {
                            handler.on_message(message, responder).await;
                        });
                    }
                    Some(Ok(DecodedFrame::Malformed { raw, error })) => {
                        warn!(%peer, error = %error, "Received unparseable frame");
                        shared.events.emit(TransportEvent::ParseError { raw, error });
                        current.send(JsonRpcResponse::parse_error().into_value());
                    }
                    Some(Err(e)) => {
                        warn!(%peer, error = %e, "Connection read failed");
                        break;
                    }
                    None => {
                        debug!(%peer, "Peer finished sending");
                        responder = None;
                    }
                }
            }
        }
    }

    shared.connections.lock().remove(&id);
    debug!(%peer, connection = id, "Connection closed");
    shared.events.emit(TransportEvent::ConnectionClosed { peer });
}

#[cfg(test)]
mod tests {
    use super::*;
    use linerpc_json_rpc_server::Dispatcher;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn dispatcher() -> Arc<Dispatcher> {
        let dispatcher = Dispatcher::new();
        dispatcher.register_blocking("add", |params| {
            let sum: i64 = params.iter().filter_map(Value::as_i64).sum();
            Ok(json!(sum))
        });
        Arc::new(dispatcher)
    }

    async fn started() -> (TcpServerTransport, SocketAddr) {
        let server = TcpServerTransport::new(TcpServerConfig::default());
        let addr = server.start(dispatcher()).await.unwrap();
        (server, addr)
    }

    async fn read_line(lines: &mut tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_fragmented_requests_are_answered() {
        let (server, addr) = started().await;
        assert_ne!(addr.port(), 0);
        assert_eq!(server.local_addr(), Some(addr));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer.write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"add\",").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        writer
            .write_all(b"\"params\":[1,2],\"id\":1}\n{\"method\":\"add\",\"params\":[5],\"id\":2}\n")
            .await
            .unwrap();

        let mut responses = vec![read_line(&mut lines).await, read_line(&mut lines).await];
        responses.sort_by_key(|r| r["id"].as_i64());
        assert_eq!(responses[0], json!({"jsonrpc": "2.0", "id": 1, "result": 3}));
        assert_eq!(responses[1], json!({"id": 2, "result": 5}));

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_frame_gets_parse_error() {
        let (server, addr) = started().await;
        let mut events = server.events();

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer.write_all(b"{oops\n").await.unwrap();
        let response = read_line(&mut lines).await;
        assert_eq!(response["error"]["code"], json!(-32700));
        assert_eq!(response["id"], Value::Null);

        writer.write_all(b"{\"method\":\"add\",\"params\":[2,2],\"id\":3}\n").await.unwrap();
        assert_eq!(read_line(&mut lines).await["result"], json!(4));

        loop {
            if let TransportEvent::ParseError { raw, .. } = events.recv().await.unwrap() {
                assert_eq!(raw, "{oops");
                break;
            }
        }
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_half_closed_peer_still_gets_responses() {
        let (server, addr) = started().await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();

        writer.write_all(b"{\"method\":\"add\",\"params\":[4,4],\"id\":1}\n").await.unwrap();
        writer.shutdown().await.unwrap();

        let mut lines = BufReader::new(reader).lines();
        assert_eq!(read_line(&mut lines).await["result"], json!(8));
        assert_eq!(lines.next_line().await.unwrap(), None);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_without_retries() {
        let (first, addr) = started().await;
        let second = TcpServerTransport::new(TcpServerConfig::new(addr));
        let mut events = second.events();

        let error = second.start(dispatcher()).await.unwrap_err();
        assert!(matches!(error, TransportError::Bind { .. }));
        assert!(matches!(events.recv().await.unwrap(), TransportEvent::BindFailed { .. }));
        first.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_retry_succeeds_when_port_frees() {
        let (first, addr) = started().await;
        let second = TcpServerTransport::new(
            TcpServerConfig::new(addr)
                .with_retries(50)
                .with_retry_interval(Duration::from_millis(20)),
        );
        let mut events = second.events();

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            first.shutdown().await.unwrap();
        });

        let bound = second.start(dispatcher()).await.unwrap();
        assert_eq!(bound, addr);
        assert!(matches!(events.recv().await.unwrap(), TransportEvent::Retry { attempt: 1, .. }));
        release.await.unwrap();
        second.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_connections() {
        let (server, addr) = started().await;
        let stream = TcpStream::connect(addr).await.unwrap();
        while server.connection_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        server.shutdown().await.unwrap();
        server.shutdown().await.unwrap();
        assert_eq!(server.connection_count(), 0);
        assert!(!server.is_running());

        let (reader, _writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        let closed = tokio::time::timeout(Duration::from_secs(5), lines.next_line()).await.unwrap();
        assert!(matches!(closed, Ok(None) | Err(_)));
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
