//! Transport lifecycle events published on a broadcast channel

use std::net::SocketAddr;

use tokio::sync::broadcast;
use tracing::trace;

/// Receiver half handed out by [`EventBus::subscribe`]
pub type EventReceiver = broadcast::Receiver<TransportEvent>;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Client: a connection attempt has started
    Connecting { address: String },
    /// Client: the connection is established
    Connected { peer: SocketAddr },
    /// Client: the established connection was lost
    Disconnected { reason: String },
    /// Client connect or server bind attempt failed and will be retried
    Retry { attempt: u32, error: String },
    /// Client: the retry budget is spent; no further automatic attempts
    RetriesExhausted { attempts: u32 },
    /// Client: the retry counter was reset after the reconnect-clear interval
    ReconnectClear,
    /// Server: the listener is bound
    Listening { local: SocketAddr },
    /// Server: binding failed for good
    BindFailed { error: String },
    ConnectionOpened { peer: SocketAddr },
    ConnectionClosed { peer: SocketAddr },
    /// A frame could not be parsed as JSON
    ParseError { raw: String, error: String },
    Shutdown,
}

impl TransportEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::Connecting { .. } => "connecting",
            TransportEvent::Connected { .. } => "connected",
            TransportEvent::Disconnected { .. } => "disconnected",
            TransportEvent::Retry { .. } => "retry",
            TransportEvent::RetriesExhausted { .. } => "retries_exhausted",
            TransportEvent::ReconnectClear => "reconnect_clear",
            TransportEvent::Listening { .. } => "listening",
            TransportEvent::BindFailed { .. } => "bind_failed",
            TransportEvent::ConnectionOpened { .. } => "connection_opened",
            TransportEvent::ConnectionClosed { .. } => "connection_closed",
            TransportEvent::ParseError { .. } => "parse_error",
            TransportEvent::Shutdown => "shutdown",
        }
    }
}

/// Fan-out of [`TransportEvent`]s to any number of subscribers.
///
/// Emitting never blocks; with no subscribers events are dropped, and slow
/// subscribers observe `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TransportEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: TransportEvent) {
        trace!(event = event.name(), "Transport event");
        let _ = self.sender.send(event);
    }
}
