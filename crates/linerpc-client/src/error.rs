//! Error types for client operations

use linerpc_transport::TransportError;
use serde_json::{Map, Value};
use thiserror::Error;

/// Result type for client operations
pub type RpcClientResult<T> = Result<T, RpcClientError>;

#[derive(Error, Debug)]
pub enum RpcClientError {
    /// Transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server answered with an error object carrying a `message`
    /// (or a bare error string)
    #[error("Server error: {message}")]
    ServerError {
        code: Option<i64>,
        message: String,
        data: Option<Value>,
        /// Remaining members of the error object
        fields: Map<String, Value>,
    },

    /// The server answered with an error value that is not error-shaped
    #[error("Server returned error payload: {0}")]
    ErrorPayload(Value),

    #[error("Invalid JSON-RPC response: {0}")]
    InvalidResponse(String),

    #[error("Id generator produced no request id")]
    MissingRequestId,

    #[error("Method not registered: {0}")]
    UnknownMethod(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RpcClientError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Build the error for a response's `error` member
    pub fn from_error_value(error: Value) -> Self {
        match error {
            Value::Object(mut object) if object.contains_key("message") => {
                let message = match object.remove("message") {
                    Some(Value::String(message)) => message,
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                let code = object.remove("code").and_then(|code| code.as_i64());
                let data = object.remove("data");
                Self::ServerError {
                    code,
                    message,
                    data,
                    fields: object,
                }
            }
            Value::String(message) => Self::ServerError {
                code: None,
                message,
                data: None,
                fields: Map::new(),
            },
            other => Self::ErrorPayload(other),
        }
    }

    /// Check if the error might be resolved by retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    /// Get error code if this is a server error
    pub fn error_code(&self) -> Option<i64> {
        match self {
            Self::ServerError { code, .. } => *code,
            _ => None,
        }
    }
}
