//! Seams between the transports and the layers above them

use std::sync::Arc;

use async_trait::async_trait;
use linerpc_json_rpc_server::Dispatcher;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TransportResult;

/// Client side: deliver one request envelope and wait for its response
#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// Send an envelope. Resolves with the matching response envelope, or
    /// `Value::Null` for envelopes without an `id`. A batch array resolves
    /// with the responses of its id-bearing elements, in element order.
    async fn request(&self, envelope: Value) -> TransportResult<Value>;

    /// Stop the transport and fail anything still outstanding
    async fn shutdown(&self) -> TransportResult<()>;
}

/// Keys (the JSON text of each non-null `id`) that a response must answer.
///
/// Empty for notifications and for batches made only of notifications.
pub(crate) fn correlation_keys(envelope: &Value) -> Vec<String> {
    fn key(element: &Value) -> Option<String> {
        element
            .get("id")
            .filter(|id| !id.is_null())
            .map(Value::to_string)
    }

    match envelope {
        Value::Array(batch) => batch.iter().filter_map(key).collect(),
        single => key(single).into_iter().collect(),
    }
}

/// Server side: consumes each decoded message of a connection
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, message: Value, responder: ResponseWriter);
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn on_message(&self, message: Value, responder: ResponseWriter) {
        self.handle_with(message, move |response| {
            responder.send(response);
        })
        .await;
    }
}

#[async_trait]
impl<T: MessageHandler + ?Sized> MessageHandler for Arc<T> {
    async fn on_message(&self, message: Value, responder: ResponseWriter) {
        (**self).on_message(message, responder).await
    }
}

/// Writes responses back to the connection a message arrived on
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    sender: mpsc::UnboundedSender<Value>,
}

impl ResponseWriter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Queue a response. Returns `false` if the connection is already gone.
    pub fn send(&self, response: Value) -> bool {
        if self.sender.send(response).is_err() {
            debug!("Connection closed before response could be written; dropping it");
            return false;
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
