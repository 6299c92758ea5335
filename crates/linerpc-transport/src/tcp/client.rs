//! Resilient TCP client transport.
//!
//! A single worker task owns the socket. Callers register a pending entry
//! keyed by the request id and hand the encoded frame to the worker through
//! an unbounded queue; frames queued while the link is down are written once
//! a connection is established.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{DecodedFrame, JsonLineCodec, encode_frame};
use crate::config::TcpClientConfig;
use crate::error::{TransportError, TransportResult};
use crate::events::{EventBus, EventReceiver, TransportEvent};
use crate::transport::{ClientTransport, correlation_keys};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    ShuttingDown,
}

#[derive(Debug)]
struct LinkState {
    state: ConnectionState,
    /// Start of the current outage; `None` while connected
    disconnected_since: Option<Instant>,
}

type Completion = oneshot::Sender<TransportResult<Value>>;

struct Shared {
    config: TcpClientConfig,
    link: Mutex<LinkState>,
    /// Serialized request id -> (registration sequence, completion)
    pending: Mutex<HashMap<String, (u64, Completion)>>,
    next_seq: AtomicU64,
    events: EventBus,
    shutdown: CancellationToken,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        self.link.lock().state
    }

    fn set_connecting(&self) {
        let mut link = self.link.lock();
        if link.state != ConnectionState::ShuttingDown {
            link.state = ConnectionState::Connecting;
        }
    }

    fn set_connected(&self) {
        let mut link = self.link.lock();
        if link.state != ConnectionState::ShuttingDown {
            link.state = ConnectionState::Connected;
            link.disconnected_since = None;
        }
    }

    fn set_disconnected(&self) {
        let mut link = self.link.lock();
        if link.state != ConnectionState::ShuttingDown {
            link.state = ConnectionState::Disconnected;
            link.disconnected_since.get_or_insert_with(Instant::now);
        }
    }

    /// Fail fast once the link has been down longer than the stop-buffering cutoff
    fn check_available(&self) -> TransportResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Shutdown);
        }
        let Some(cutoff) = self.config.stop_buffering_after else {
            return Ok(());
        };
        let link = self.link.lock();
        if link.state == ConnectionState::Connected {
            return Ok(());
        }
        match link.disconnected_since {
            Some(since) if since.elapsed() > cutoff => Err(TransportError::ConnectionUnavailable),
            _ => Ok(()),
        }
    }

    fn route_response(&self, response: Value) {
        if let Value::Array(batch) = response {
            for item in batch {
                self.route_response(item);
            }
            return;
        }

        let key = match response.get("id") {
            Some(id) if !id.is_null() => id.to_string(),
            _ => {
                debug!("Discarding response without id");
                return;
            }
        };
        let entry = self.pending.lock().remove(&key);
        match entry {
            Some((_, completion)) => {
                debug!(id = %key, "Routing response to pending request");
                let _ = completion.send(Ok(response));
            }
            None => debug!(id = %key, "No pending request for response; discarding"),
        }
    }

    fn fail_pending(&self) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        let count = drained.len();
        for (_, (_, completion)) in drained {
            let _ = completion.send(Err(TransportError::Shutdown));
        }
        count
    }
}

/// Removes its pending entry when the request future finishes or is dropped
struct PendingGuard<'a> {
    shared: &'a Shared,
    key: String,
    seq: u64,
}

impl PendingGuard<'_> {
    /// Returns `true` if the entry was still pending
    fn remove(&self) -> bool {
        let mut pending = self.shared.pending.lock();
        match pending.get(&self.key) {
            Some((seq, _)) if *seq == self.seq => {
                pending.remove(&self.key);
                true
            }
            _ => false,
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.remove();
    }
}

/// TCP client transport with reconnect, retry, timeout and stop-buffering policies
pub struct TcpClientTransport {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Bytes>,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl TcpClientTransport {
    /// Create the transport and start connecting in the background.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(config: TcpClientConfig) -> Self {
        Self::with_event_bus(config, EventBus::new())
    }

    /// Like [`TcpClientTransport::new`], publishing events on a bus the
    /// caller subscribed to beforehand
    pub fn with_event_bus(config: TcpClientConfig, events: EventBus) -> Self {
        let shared = Arc::new(Shared {
            config,
            link: Mutex::new(LinkState {
                state: ConnectionState::Connecting,
                disconnected_since: Some(Instant::now()),
            }),
            pending: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            events,
            shutdown: CancellationToken::new(),
        });
        let (outbound, queue) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(shared.clone(), queue));

        Self {
            shared,
            outbound,
            worker: Mutex::new(Some(worker)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &TcpClientConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn events(&self) -> EventReceiver {
        self.shared.events.subscribe()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    fn enqueue(&self, frame: Bytes) -> TransportResult<()> {
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Shutdown)
    }
}

#[async_trait]
impl ClientTransport for TcpClientTransport {
    async fn request(&self, envelope: Value) -> TransportResult<Value> {
        self.shared.check_available()?;

        let frame = encode_frame(&envelope)?;
        let keys = correlation_keys(&envelope);
        if keys.is_empty() {
            self.enqueue(frame)?;
            return Ok(Value::Null);
        }
        let unique: HashSet<&String> = keys.iter().collect();
        if unique.len() != keys.len() {
            let repeated = keys
                .iter()
                .enumerate()
                .find(|(i, key)| keys[..*i].contains(*key))
                .map(|(_, key)| key.clone())
                .unwrap_or_default();
            return Err(TransportError::DuplicateRequestId(repeated));
        }

        let mut guards = Vec::with_capacity(keys.len());
        let mut receivers = Vec::with_capacity(keys.len());
        {
            let mut pending = self.shared.pending.lock();
            if let Some(taken) = keys.iter().find(|key| pending.contains_key(*key)) {
                return Err(TransportError::DuplicateRequestId(taken.clone()));
            }
            for key in keys {
                let (completion, receiver) = oneshot::channel();
                let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
                pending.insert(key.clone(), (seq, completion));
                guards.push(PendingGuard {
                    shared: &self.shared,
                    key,
                    seq,
                });
                receivers.push(receiver);
            }
        }

        // Shutdown drains the table after cancelling; entries added past the drain are ours to fail
        if self.shared.shutdown.is_cancelled() {
            return Err(TransportError::Shutdown);
        }
        self.enqueue(frame)?;

        let gathered = async move {
            let mut responses = Vec::with_capacity(receivers.len());
            for receiver in receivers {
                responses.push(receiver.await.unwrap_or(Err(TransportError::Shutdown))?);
            }
            Ok::<_, TransportError>(responses)
        };
        tokio::pin!(gathered);

        let outcome = match self.shared.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut gathered).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let mut expired = false;
                    for guard in &guards {
                        expired |= guard.remove();
                    }
                    if expired {
                        warn!(
                            id = %guards[0].key,
                            timeout_ms = limit.as_millis() as u64,
                            "Request timed out"
                        );
                        return Err(TransportError::RequestTimedOut { after: limit });
                    }
                    // Every response claimed its entry as the timer fired
                    gathered.await
                }
            },
            None => gathered.await,
        };
        drop(guards);

        let mut responses = outcome?;
        if envelope.is_array() {
            Ok(Value::Array(responses))
        } else {
            Ok(responses.pop().unwrap_or(Value::Null))
        }
    }

    async fn shutdown(&self) -> TransportResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!(address = %self.shared.config.address, "Shutting down TCP client transport");

        self.shared.link.lock().state = ConnectionState::ShuttingDown;
        self.shared.shutdown.cancel();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "TCP client worker ended abnormally");
            }
        }

        let failed = self.shared.fail_pending();
        if failed > 0 {
            debug!(count = failed, "Failed pending requests on shutdown");
        }
        self.shared.events.emit(TransportEvent::Shutdown);
        Ok(())
    }
}

impl Drop for TcpClientTransport {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

enum ConnectionEnd {
    Shutdown,
    Lost(String),
}

async fn connect(address: &str) -> std::io::Result<(TcpStream, SocketAddr)> {
    let stream = TcpStream::connect(address).await?;
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr()?;
    Ok((stream, peer))
}

async fn run_worker(shared: Arc<Shared>, mut queue: mpsc::UnboundedReceiver<Bytes>) {
    let config = &shared.config;
    let mut unsent: Option<Bytes> = None;
    let mut failures: u32 = 0;

    loop {
        shared.set_connecting();
        shared.events.emit(TransportEvent::Connecting {
            address: config.address.clone(),
        });
        debug!(address = %config.address, "Connecting");

        let attempt = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            attempt = connect(&config.address) => attempt,
        };

        match attempt {
            Ok((stream, peer)) => {
                failures = 0;
                shared.set_connected();
                info!(%peer, "TCP client connected");
                shared.events.emit(TransportEvent::Connected { peer });

                match serve_connection(&shared, stream, &mut queue, &mut unsent).await {
                    ConnectionEnd::Shutdown => break,
                    ConnectionEnd::Lost(reason) => {
                        shared.set_disconnected();
                        warn!(%peer, reason = %reason, "TCP connection lost; reconnecting");
                        shared.events.emit(TransportEvent::Disconnected { reason });
                    }
                }
            }
            Err(e) => {
                failures += 1;
                shared.set_disconnected();

                if failures <= config.retries {
                    warn!(
                        address = %config.address,
                        attempt = failures,
                        error = %e,
                        "Connection attempt failed; retrying"
                    );
                    shared.events.emit(TransportEvent::Retry {
                        attempt: failures,
                        error: e.to_string(),
                    });
                    if !pause(&shared, config.retry_interval).await {
                        break;
                    }
                    continue;
                }

                warn!(address = %config.address, attempts = failures, error = %e, "Connection retries exhausted");
                shared.events.emit(TransportEvent::RetriesExhausted { attempts: failures });

                match config.reconnect_clear_interval {
                    Some(interval) => {
                        if !pause(&shared, interval).await {
                            break;
                        }
                        failures = 0;
                        debug!("Reconnect clear interval elapsed; resetting retries");
                        shared.events.emit(TransportEvent::ReconnectClear);
                    }
                    None => {
                        shared.shutdown.cancelled().await;
                        break;
                    }
                }
            }
        }
    }
    debug!(address = %config.address, "TCP client worker stopped");
}

/// Sleep unless shutdown comes first. Returns `false` on shutdown.
async fn pause(shared: &Shared, duration: std::time::Duration) -> bool {
    tokio::select! {
        biased;
        _ = shared.shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

async fn serve_connection(
    shared: &Shared,
    stream: TcpStream,
    queue: &mut mpsc::UnboundedReceiver<Bytes>,
    unsent: &mut Option<Bytes>,
) -> ConnectionEnd {
    let (reader, mut writer) = stream.into_split();
    let mut frames = FramedRead::new(
        reader,
        JsonLineCodec::with_max_frame_bytes(shared.config.max_frame_bytes),
    );

    if let Some(frame) = unsent.take() {
        if let Err(e) = writer.write_all(&frame).await {
            *unsent = Some(frame);
            return ConnectionEnd::Lost(e.to_string());
        }
    }

    loop {
        tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => {
                let _ = writer.shutdown().await;
                return ConnectionEnd::Shutdown;
            }
            next = queue.recv() => {
                let Some(frame) = next else {
                    // Every sender is gone: the transport was dropped
                    return ConnectionEnd::Shutdown;
                };
                if let Err(e) = writer.write_all(&frame).await {
                    *unsent = Some(frame);
                    return ConnectionEnd::Lost(e.to_string());
                }
            }
            inbound = frames.next() => match inbound {
                Some(Ok(DecodedFrame::Message(response))) => shared.route_response(response),
                Some(Ok(DecodedFrame::Malformed { raw, error })) => {
                    warn!(error = %error, "Discarding unparseable frame from server");
                    shared.events.emit(TransportEvent::ParseError { raw, error });
                }
                Some(Err(e)) => return ConnectionEnd::Lost(e.to_string()),
                None => return ConnectionEnd::Lost("connection closed by peer".to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    /// Echo server answering every request line with `{"id": <id>, "result": <params>}`
    async fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (reader, mut writer) = stream.into_split();
                    let mut lines = BufReader::new(reader).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        let request: Value = serde_json::from_str(&line).unwrap();
                        if request.get("id").is_none() {
                            continue;
                        }
                        let response = json!({"id": request["id"], "result": request["params"]});
                        let frame = encode_frame(&response).unwrap();
                        writer.write_all(&frame).await.unwrap();
                    }
                });
            }
        });
        addr
    }

    /// Accepts connections and never answers
    async fn silent_server() -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        (addr, handle)
    }

    async fn closed_port() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    #[tokio::test]
    async fn test_request_response_roundtrip() {
        let addr = echo_server().await;
        let transport = TcpClientTransport::new(TcpClientConfig::new(addr.to_string()));

        let response = transport
            .request(json!({"jsonrpc": "2.0", "method": "echo", "params": [1, 2], "id": 1}))
            .await
            .unwrap();
        assert_eq!(response, json!({"id": 1, "result": [1, 2]}));
        assert_eq!(transport.state(), ConnectionState::Connected);
        assert_eq!(transport.pending_count(), 0);

        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_matched_by_id() {
        let addr = echo_server().await;
        let transport = Arc::new(TcpClientTransport::new(TcpClientConfig::new(addr.to_string())));

        let calls = (0..20).map(|i| {
            let transport = transport.clone();
            async move {
                transport
                    .request(json!({"method": "echo", "params": [i], "id": format!("req-{}", i)}))
                    .await
                    .unwrap()
            }
        });
        let responses = futures::future::join_all(calls).await;
        for (i, response) in responses.iter().enumerate() {
            assert_eq!(response["id"], json!(format!("req-{}", i)));
            assert_eq!(response["result"], json!([i]));
        }
        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_notification_resolves_immediately() {
        let addr = echo_server().await;
        let transport = TcpClientTransport::new(TcpClientConfig::new(addr.to_string()));
        let response = transport
            .request(json!({"method": "log", "params": ["hi"]}))
            .await
            .unwrap();
        assert_eq!(response, Value::Null);
        assert_eq!(transport.pending_count(), 0);
        transport.shutdown().await.unwrap();
    }

    /// Answers each batch line in reverse element order, split over two frames
    async fn batch_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let batch: Vec<Value> = serde_json::from_str(&line).unwrap();
                let mut head: Vec<Value> = batch
                    .iter()
                    .rev()
                    .map(|request| json!({"id": request["id"], "result": request["params"]}))
                    .collect();
                let tail = head.split_off(1);
                for part in [head, tail] {
                    let frame = encode_frame(&Value::Array(part)).unwrap();
                    writer.write_all(&frame).await.unwrap();
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_batch_resolves_with_every_element() {
        let addr = batch_server().await;
        let transport = TcpClientTransport::new(TcpClientConfig::new(addr.to_string()));

        let response = transport
            .request(json!([
                {"method": "echo", "params": ["a"], "id": 1},
                {"method": "log", "params": ["skip"]},
                {"method": "echo", "params": ["b"], "id": "two"}
            ]))
            .await
            .unwrap();
        assert_eq!(
            response,
            json!([
                {"id": 1, "result": ["a"]},
                {"id": "two", "result": ["b"]}
            ])
        );
        assert_eq!(transport.pending_count(), 0);

        let error = transport
            .request(json!([{"method": "a", "id": 5}, {"method": "b", "id": 5}]))
            .await
            .unwrap_err();
        assert!(matches!(error, TransportError::DuplicateRequestId(ref id) if id == "5"));
        assert_eq!(transport.pending_count(), 0);

        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_batch_times_out_as_a_whole() {
        let (addr, _server) = silent_server().await;
        let transport = TcpClientTransport::new(
            TcpClientConfig::new(addr.to_string()).with_timeout(Some(Duration::from_millis(100))),
        );

        let error = transport
            .request(json!([{"method": "a", "id": 1}, {"method": "b", "id": 2}]))
            .await
            .unwrap_err();
        assert!(error.is_timeout());
        assert_eq!(transport.pending_count(), 0);

        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let (addr, _server) = silent_server().await;
        let timeout = Duration::from_millis(100);
        let transport = TcpClientTransport::new(
            TcpClientConfig::new(addr.to_string()).with_timeout(Some(timeout)),
        );

        let started = Instant::now();
        let error = transport
            .request(json!({"method": "never", "id": 1}))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(error, TransportError::RequestTimedOut { .. }));
        assert!(elapsed >= timeout);
        assert!(elapsed < Duration::from_secs(2));
        assert_eq!(transport.pending_count(), 0);
        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_pending_id_rejected() {
        let (addr, _server) = silent_server().await;
        let transport = Arc::new(TcpClientTransport::new(
            TcpClientConfig::new(addr.to_string()).with_timeout(None),
        ));

        let first = tokio::spawn({
            let transport = transport.clone();
            async move { transport.request(json!({"method": "a", "id": 7})).await }
        });
        while transport.pending_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let error = transport.request(json!({"method": "b", "id": 7})).await.unwrap_err();
        assert!(matches!(error, TransportError::DuplicateRequestId(ref id) if id == "7"));

        transport.shutdown().await.unwrap();
        assert!(matches!(first.await.unwrap(), Err(TransportError::Shutdown)));
    }

    #[tokio::test]
    async fn test_stop_buffering_fails_fast() {
        let addr = closed_port().await;
        let transport = TcpClientTransport::new(
            TcpClientConfig::new(addr.to_string())
                .with_retries(100)
                .with_retry_interval(Duration::from_millis(20))
                .with_stop_buffering_after(Some(Duration::from_millis(50)))
                .with_timeout(Some(Duration::from_secs(5))),
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        let started = Instant::now();
        let error = transport
            .request(json!({"method": "x", "id": 1}))
            .await
            .unwrap_err();
        assert!(matches!(error, TransportError::ConnectionUnavailable));
        assert!(started.elapsed() < Duration::from_millis(50));
        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_retries_exhausted_event() {
        let addr = closed_port().await;
        let events = EventBus::new();
        let mut receiver = events.subscribe();
        let transport = TcpClientTransport::with_event_bus(
            TcpClientConfig::new(addr.to_string())
                .with_retries(2)
                .with_retry_interval(Duration::from_millis(10)),
            events,
        );

        let mut retries = 0;
        let exhausted = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match receiver.recv().await.unwrap() {
                    TransportEvent::Retry { .. } => retries += 1,
                    TransportEvent::RetriesExhausted { attempts } => break attempts,
                    _ => {}
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(retries, 2);
        assert_eq!(exhausted, 3);
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_clear_starts_new_round() {
        let addr = closed_port().await;
        let events = EventBus::new();
        let mut receiver = events.subscribe();
        let transport = TcpClientTransport::with_event_bus(
            TcpClientConfig::new(addr.to_string())
                .with_retries(0)
                .with_retry_interval(Duration::from_millis(10))
                .with_reconnect_clear_interval(Some(Duration::from_millis(20))),
            events,
        );

        let cleared = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if receiver.recv().await.unwrap() == TransportEvent::ReconnectClear {
                    break;
                }
            }
        })
        .await;
        assert!(cleared.is_ok());
        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_fails_pending_and_is_idempotent() {
        let (addr, _server) = silent_server().await;
        let transport = Arc::new(TcpClientTransport::new(
            TcpClientConfig::new(addr.to_string()).with_timeout(None),
        ));

        let pending = tokio::spawn({
            let transport = transport.clone();
            async move { transport.request(json!({"method": "wait", "id": 1})).await }
        });
        while transport.pending_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        transport.shutdown().await.unwrap();
        transport.shutdown().await.unwrap();
        assert!(matches!(pending.await.unwrap(), Err(TransportError::Shutdown)));
        assert_eq!(transport.state(), ConnectionState::ShuttingDown);

        let error = transport.request(json!({"method": "late", "id": 2})).await.unwrap_err();
        assert!(matches!(error, TransportError::Shutdown));
    }

    #[tokio::test]
    async fn test_dropped_request_future_clears_pending() {
        let (addr, _server) = silent_server().await;
        let transport = TcpClientTransport::new(
            TcpClientConfig::new(addr.to_string()).with_timeout(None),
        );

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            transport.request(json!({"method": "wait", "id": 1})),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(transport.pending_count(), 0);
        transport.shutdown().await.unwrap();
    }
}
