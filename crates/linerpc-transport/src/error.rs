//! Error types for transport operations

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised while decoding the framed byte stream
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame exceeds {limit} bytes without a delimiter")]
    FrameTooLarge { limit: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Transport-level errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// The link has been down longer than the stop-buffering cutoff
    #[error("Connection Unavailable")]
    ConnectionUnavailable,

    #[error("Request Timed Out")]
    RequestTimedOut { after: Duration },

    #[error("Transport has been shut down")]
    Shutdown,

    #[error("Handler finished without responding")]
    NoResponse,

    #[error("Request id {0} is already pending")]
    DuplicateRequestId(String),

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Compression error: {0}")]
    Compression(String),
}

impl TransportError {
    /// Check if a later attempt of the same request could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionUnavailable
                | TransportError::RequestTimedOut { .. }
                | TransportError::Io(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::RequestTimedOut { .. })
    }
}
