//! Request dispatch: classify a decoded value, resolve methods and shape responses.

use std::any::Any;
use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::error::JsonRpcErrorObject;
use crate::handler::{Completion, Handler, HandlerError, HandlerResult};
use crate::response::JsonRpcResponse;
use crate::METHOD_LIST;

/// Report of a panic raised synchronously by a callback-style handler
#[derive(Debug, Clone)]
pub struct HandlerFault {
    pub method: String,
    pub message: String,
    pub backtrace: String,
}

/// Receives [`HandlerFault`] reports after the error envelope has been delivered
pub type FaultSink = Arc<dyn Fn(&HandlerFault) + Send + Sync>;

/// Response value plus any faults to report once it has been delivered
struct Dispatched {
    response: Value,
    faults: Vec<HandlerFault>,
}

impl Dispatched {
    fn reply(response: JsonRpcResponse) -> Self {
        Self {
            response: response.into_value(),
            faults: Vec::new(),
        }
    }
}

/// JSON-RPC method table and dispatcher
pub struct Dispatcher {
    methods: RwLock<HashMap<String, Handler>>,
    fault_sink: FaultSink,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            methods: RwLock::new(HashMap::new()),
            fault_sink: Arc::new(log_fault),
        }
    }

    pub fn from_methods<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = (S, Handler)>,
        S: Into<String>,
    {
        let dispatcher = Self::new();
        {
            let mut table = dispatcher.methods.write();
            for (name, handler) in methods {
                table.insert(name.into(), handler);
            }
        }
        dispatcher
    }

    /// Replace the default fault sink (which logs at error level)
    pub fn with_fault_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&HandlerFault) + Send + Sync + 'static,
    {
        self.fault_sink = Arc::new(sink);
        self
    }

    /// Register a handler, returning the one it replaced
    pub fn register(&self, name: impl Into<String>, handler: Handler) -> Option<Handler> {
        let name = name.into();
        debug!(method = %name, kind = ?handler.kind(), "Registering method");
        self.methods.write().insert(name, handler)
    }

    pub fn register_blocking<F>(&self, name: impl Into<String>, func: F) -> Option<Handler>
    where
        F: Fn(Vec<Value>) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(name, Handler::blocking(func))
    }

    pub fn register_callback<F>(
        &self,
        name: impl Into<String>,
        params: usize,
        func: F,
    ) -> Option<Handler>
    where
        F: Fn(Vec<Value>, Completion) + Send + Sync + 'static,
    {
        self.register(name, Handler::callback(params, func))
    }

    pub fn register_promise<F, Fut>(&self, name: impl Into<String>, func: F) -> Option<Handler>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(name, Handler::promise(func))
    }

    pub fn unregister(&self, name: &str) -> Option<Handler> {
        self.methods.write().remove(name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        name == METHOD_LIST || self.methods.read().contains_key(name)
    }

    /// Sorted names of every callable method, `rpc.methodList` included
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.read().keys().cloned().collect();
        if !names.iter().any(|name| name == METHOD_LIST) {
            names.push(METHOD_LIST.to_string());
        }
        names.sort();
        names
    }

    /// Resolve one decoded value (request or batch) into its response value
    pub async fn handle(&self, message: Value) -> Value {
        let mut response = Value::Null;
        self.handle_with(message, |value| response = value).await;
        response
    }

    /// Resolve one decoded value and hand the response to `respond`.
    ///
    /// Faults raised by callback handlers are reported to the fault sink only
    /// after `respond` has returned.
    pub async fn handle_with<F>(&self, message: Value, respond: F)
    where
        F: FnOnce(Value) + Send,
    {
        let Dispatched { response, faults } = self.dispatch_value(message).await;
        respond(response);
        for fault in &faults {
            (self.fault_sink)(fault);
        }
    }

    fn dispatch_value(&self, message: Value) -> BoxFuture<'_, Dispatched> {
        async move {
            match message {
                Value::Array(batch) => self.dispatch_batch(batch).await,
                Value::Object(request) => self.dispatch_request(request).await,
                _ => Dispatched::reply(invalid_request(Value::Null, None)),
            }
        }
        .boxed()
    }

    async fn dispatch_batch(&self, batch: Vec<Value>) -> Dispatched {
        if batch.is_empty() {
            return Dispatched::reply(invalid_request(Value::Null, None));
        }

        let expected = batch.len();
        let mut pending: FuturesUnordered<_> =
            batch.into_iter().map(|item| self.dispatch_value(item)).collect();

        let mut responses = Vec::with_capacity(expected);
        let mut faults = Vec::new();
        while let Some(done) = pending.next().await {
            responses.push(done.response);
            faults.extend(done.faults);
        }
        debug!(count = responses.len(), "Batch complete");

        Dispatched {
            response: Value::Array(responses),
            faults,
        }
    }

    async fn dispatch_request(&self, mut request: Map<String, Value>) -> Dispatched {
        let version = request.remove("jsonrpc");
        let id = request.remove("id").unwrap_or(Value::Null);

        let method = match request.remove("method") {
            Some(Value::String(method)) if !method.is_empty() => method,
            _ => return Dispatched::reply(invalid_request(id, version)),
        };
        let params = normalize_params(request.remove("params"));

        let handler = self.methods.read().get(&method).cloned();
        let handler = match handler {
            Some(handler) => handler,
            None if method == METHOD_LIST => {
                let names = self.method_names();
                return Dispatched::reply(
                    JsonRpcResponse::success(id, Value::from(names)).with_version(version),
                );
            }
            None => {
                debug!(method = %method, "Method not found");
                return Dispatched::reply(
                    JsonRpcResponse::from_error_object(id, &JsonRpcErrorObject::method_not_found())
                        .with_version(version),
                );
            }
        };

        let (result, fault) = match handler {
            Handler::Blocking(func) => {
                let result = catch_unwind(AssertUnwindSafe(|| func(params)))
                    .unwrap_or_else(|panic| Err(HandlerError::exception(panic_message(&*panic))));
                (result, None)
            }
            Handler::Promise(func) => {
                let result = match catch_unwind(AssertUnwindSafe(|| func(params))) {
                    Ok(future) => AssertUnwindSafe(future)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| {
                            Err(HandlerError::exception(panic_message(&*panic)))
                        }),
                    Err(panic) => Err(HandlerError::exception(panic_message(&*panic))),
                };
                (result, None)
            }
            Handler::Callback {
                params: declared,
                func,
            } => {
                if params.len() > declared {
                    debug!(
                        method = %method,
                        declared,
                        supplied = params.len(),
                        "Too many params for callback handler"
                    );
                    return Dispatched::reply(
                        JsonRpcResponse::from_error_object(
                            id,
                            &JsonRpcErrorObject::method_not_found(),
                        )
                        .with_version(version),
                    );
                }
                self.run_callback(&method, func, pad_params(params, declared))
                    .await
            }
        };

        let response = match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => match error.into_error_value() {
                Some(payload) => JsonRpcResponse::error(id, payload),
                None => JsonRpcResponse::success(id, Value::Null),
            },
        };

        Dispatched {
            response: response.with_version(version).into_value(),
            faults: fault.into_iter().collect(),
        }
    }

    async fn run_callback(
        &self,
        method: &str,
        func: Arc<dyn Fn(Vec<Value>, Completion) + Send + Sync>,
        params: Vec<Value>,
    ) -> (HandlerResult, Option<HandlerFault>) {
        let (completion, receiver) = Completion::channel();
        let outcome = catch_unwind(AssertUnwindSafe(|| func(params, completion.clone())));

        let fault = match outcome {
            Ok(()) => None,
            Err(panic) => {
                let fault = HandlerFault {
                    method: method.to_string(),
                    message: panic_message(&*panic),
                    backtrace: Backtrace::force_capture().to_string(),
                };
                // An earlier completion wins over the panic
                completion.err(
                    HandlerError::exception(fault.message.clone())
                        .with_field("stack", fault.backtrace.clone()),
                );
                Some(fault)
            }
        };
        drop(completion);

        let result = match receiver.await {
            Ok(result) => result,
            Err(_) => Err(HandlerError::exception("completion dropped")),
        };
        (result, fault)
    }
}

fn normalize_params(params: Option<Value>) -> Vec<Value> {
    match params {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(params)) => params,
        Some(other) => vec![other],
    }
}

fn pad_params(mut params: Vec<Value>, declared: usize) -> Vec<Value> {
    params.resize(declared, Value::Null);
    params
}

fn invalid_request(id: Value, version: Option<Value>) -> JsonRpcResponse {
    JsonRpcResponse::from_error_object(id, &JsonRpcErrorObject::invalid_request())
        .with_version(version)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

fn log_fault(fault: &HandlerFault) {
    error!(
        method = %fault.method,
        message = %fault.message,
        "Method handler faulted synchronously"
    );
}
