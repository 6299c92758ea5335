//! Binds one dispatcher to any number of server transports

use std::net::SocketAddr;
use std::sync::Arc;

use linerpc_json_rpc_server::Dispatcher;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::TcpServerConfig;
use crate::error::TransportResult;
use crate::tcp::TcpServerTransport;

pub struct RpcServer {
    dispatcher: Arc<Dispatcher>,
    transports: Mutex<Vec<Arc<TcpServerTransport>>>,
}

impl RpcServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            transports: Mutex::new(Vec::new()),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Create, start and track a TCP listener
    pub async fn listen_tcp(&self, config: TcpServerConfig) -> TransportResult<Arc<TcpServerTransport>> {
        let transport = Arc::new(TcpServerTransport::new(config));
        self.attach(transport.clone()).await?;
        Ok(transport)
    }

    /// Start an already constructed transport (for callers that subscribe to
    /// its events first) and track it
    pub async fn attach(&self, transport: Arc<TcpServerTransport>) -> TransportResult<SocketAddr> {
        let local = transport.start(self.dispatcher.clone()).await?;
        self.transports.lock().push(transport);
        info!(%local, "Server transport attached");
        Ok(local)
    }

    pub fn transports(&self) -> Vec<Arc<TcpServerTransport>> {
        self.transports.lock().clone()
    }

    /// Shut down every transport; the first failure is returned after all were attempted
    pub async fn shutdown(&self) -> TransportResult<()> {
        let transports: Vec<_> = self.transports.lock().drain(..).collect();
        let mut first_error = None;
        for transport in transports {
            if let Err(e) = transport.shutdown().await {
                warn!(error = %e, "Server transport failed to shut down");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
