//! In-process transport handing envelopes straight to a [`MessageHandler`]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{TransportError, TransportResult};
use crate::transport::{ClientTransport, MessageHandler, ResponseWriter, correlation_keys};

pub struct LoopbackTransport {
    handler: Arc<dyn MessageHandler>,
    closed: AtomicBool,
}

impl LoopbackTransport {
    pub fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            handler,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ClientTransport for LoopbackTransport {
    async fn request(&self, envelope: Value) -> TransportResult<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Shutdown);
        }

        let notification = correlation_keys(&envelope).is_empty();
        let (responder, mut responses) = ResponseWriter::channel();
        self.handler.on_message(envelope, responder).await;

        if notification {
            return Ok(Value::Null);
        }
        match responses.recv().await {
            Some(response) => Ok(response),
            None => {
                debug!("Loopback handler dropped its responder without answering");
                Err(TransportError::NoResponse)
            }
        }
    }

    async fn shutdown(&self) -> TransportResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
