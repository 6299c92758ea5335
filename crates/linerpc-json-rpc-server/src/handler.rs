//! Method handler variants and the completion handle passed to callback-style handlers.

use std::future::Future;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::{JsonRpcErrorCode, JsonRpcErrorObject};

/// Application-level failure produced by a method handler
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandlerError {
    /// An exception-like failure. `fields` become the error payload, with
    /// `code` forced to Internal-Error and `message` set.
    #[error("{message}")]
    Exception {
        message: String,
        fields: Map<String, Value>,
    },
    /// An arbitrary JSON value used verbatim as the error payload.
    /// A falsy payload (`null`, `false`, `0`, `""`) means "no error" and
    /// produces a `null` result.
    #[error("error payload: {0}")]
    Payload(Value),
}

impl HandlerError {
    pub fn exception(message: impl Into<String>) -> Self {
        Self::Exception {
            message: message.into(),
            fields: Map::new(),
        }
    }

    pub fn payload(value: impl Into<Value>) -> Self {
        Self::Payload(value.into())
    }

    /// Attach an extra field to an exception; no-op for payload errors
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Self::Exception { fields, .. } = &mut self {
            fields.insert(key.into(), value.into());
        }
        self
    }

    /// The wire error payload, or `None` when the payload is falsy
    pub fn into_error_value(self) -> Option<Value> {
        match self {
            Self::Exception {
                message,
                mut fields,
            } => {
                let data = fields.remove("data");
                fields.remove("code");
                fields.remove("message");
                let error = JsonRpcErrorObject {
                    code: JsonRpcErrorCode::InternalError.code(),
                    message,
                    data,
                    fields,
                };
                Some(error.to_value())
            }
            Self::Payload(value) if is_falsy(&value) => None,
            Self::Payload(value) => Some(value),
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(error: serde_json::Error) -> Self {
        Self::exception(error.to_string())
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

pub type HandlerResult = Result<Value, HandlerError>;

type BlockingFn = dyn Fn(Vec<Value>) -> HandlerResult + Send + Sync;
type CallbackFn = dyn Fn(Vec<Value>, Completion) + Send + Sync;
type PromiseFn = dyn Fn(Vec<Value>) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// A registered method implementation
#[derive(Clone)]
pub enum Handler {
    /// Synchronous function; always dispatched regardless of how many params arrive
    Blocking(Arc<BlockingFn>),
    /// Callback-style function that declares `params` positional slots and
    /// receives a [`Completion`] in the extra slot
    Callback { params: usize, func: Arc<CallbackFn> },
    /// Async function; always dispatched regardless of how many params arrive
    Promise(Arc<PromiseFn>),
}

/// Discriminant of a [`Handler`], for introspection and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Blocking,
    Callback,
    Promise,
}

impl Handler {
    pub fn blocking<F>(func: F) -> Self
    where
        F: Fn(Vec<Value>) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Blocking(Arc::new(func))
    }

    pub fn callback<F>(params: usize, func: F) -> Self
    where
        F: Fn(Vec<Value>, Completion) + Send + Sync + 'static,
    {
        Self::Callback {
            params,
            func: Arc::new(func),
        }
    }

    pub fn promise<F, Fut>(func: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::Promise(Arc::new(move |params| Box::pin(func(params))))
    }

    pub fn kind(&self) -> HandlerKind {
        match self {
            Self::Blocking(_) => HandlerKind::Blocking,
            Self::Callback { .. } => HandlerKind::Callback,
            Self::Promise(_) => HandlerKind::Promise,
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Callback { params, .. } => f
                .debug_struct("Callback")
                .field("params", params)
                .finish_non_exhaustive(),
            other => write!(f, "{:?}", other.kind()),
        }
    }
}

/// One-shot completion handle given to callback-style handlers.
///
/// Cloneable so it can be moved into spawned work; only the first call to
/// [`Completion::complete`] has any effect.
#[derive(Clone)]
pub struct Completion {
    sender: Arc<Mutex<Option<oneshot::Sender<HandlerResult>>>>,
}

impl Completion {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<HandlerResult>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Complete the call. Returns `false` if it had already been completed.
    pub fn complete(&self, result: HandlerResult) -> bool {
        match self.sender.lock().take() {
            Some(tx) => {
                // The receiver may be gone if the dispatch was abandoned
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    pub fn ok(&self, value: impl Into<Value>) -> bool {
        self.complete(Ok(value.into()))
    }

    pub fn err(&self, error: HandlerError) -> bool {
        self.complete(Err(error))
    }

    pub fn is_completed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("completed", &self.is_completed())
            .finish()
    }
}
