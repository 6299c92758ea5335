//! Client core: builds request envelopes and interprets responses

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use linerpc_json_rpc_server::{JsonRpcRequest, JsonRpcResponse, METHOD_LIST, RequestId, ResponseOutcome};
use linerpc_transport::ClientTransport;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{RpcClientError, RpcClientResult};

/// Produces the correlation id for each request; `None` aborts the request
pub type IdGenerator = Arc<dyn Fn() -> Option<RequestId> + Send + Sync>;

/// Monotonically increasing integer ids starting at 1
pub fn sequential_ids() -> IdGenerator {
    let next = AtomicI64::new(1);
    Arc::new(move || Some(RequestId::Number(next.fetch_add(1, Ordering::Relaxed))))
}

/// JSON-RPC client over any [`ClientTransport`]
pub struct RpcClient {
    transport: Arc<dyn ClientTransport>,
    config: ClientConfig,
    id_generator: IdGenerator,
    /// Names that have a [`MethodProxy`]
    methods: RwLock<BTreeSet<String>>,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn ClientTransport>, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            id_generator: sequential_ids(),
            methods: RwLock::new(BTreeSet::new()),
        }
    }

    pub fn builder() -> RpcClientBuilder {
        RpcClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn ClientTransport> {
        &self.transport
    }

    /// Call `method` with positional `params` and wait for its result
    pub async fn request(&self, method: &str, params: Vec<Value>) -> RpcClientResult<Value> {
        let id = (self.id_generator)().ok_or(RpcClientError::MissingRequestId)?;
        debug!(method = method, id = %id, "Sending request");

        let envelope = serde_json::to_value(JsonRpcRequest::new(id, method, params))?;
        let response = self.transport.request(envelope).await?;
        interpret_response(response)
    }

    /// Send a notification; no response is expected
    pub async fn notify(&self, method: &str, params: Vec<Value>) -> RpcClientResult<()> {
        debug!(method = method, "Sending notification");
        let envelope = serde_json::to_value(JsonRpcRequest::notification(method, params))?;
        self.transport.request(envelope).await?;
        Ok(())
    }

    /// Create proxies for the given method names
    pub fn register<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut methods = self.methods.write();
        methods.extend(names.into_iter().map(Into::into));
    }

    pub fn registered_methods(&self) -> Vec<String> {
        self.methods.read().iter().cloned().collect()
    }

    /// Proxy for a registered method
    pub fn method(&self, name: &str) -> RpcClientResult<MethodProxy<'_>> {
        if !self.methods.read().contains(name) {
            return Err(RpcClientError::UnknownMethod(name.to_string()));
        }
        Ok(MethodProxy {
            client: self,
            name: name.to_string(),
        })
    }

    /// Ask the server for its method list and register every name
    pub async fn auto_register(&self) -> RpcClientResult<Vec<String>> {
        let listed = self.request(METHOD_LIST, Vec::new()).await?;
        let names: Vec<String> = serde_json::from_value(listed).map_err(|e| {
            RpcClientError::InvalidResponse(format!("{} returned a non-list: {}", METHOD_LIST, e))
        })?;
        debug!(count = names.len(), "Registering server methods");
        self.register(names.iter().cloned());
        Ok(names)
    }

    pub async fn shutdown(&self) -> RpcClientResult<()> {
        info!("Shutting down RPC client");
        self.transport.shutdown().await?;
        Ok(())
    }
}

/// Turn a raw response envelope into the call's outcome.
///
/// The envelope must carry exactly one of `result` or `error`.
pub fn interpret_response(response: Value) -> RpcClientResult<Value> {
    let response = JsonRpcResponse::from_value(response)
        .map_err(|e| RpcClientError::InvalidResponse(e.to_string()))?;
    match response.outcome {
        ResponseOutcome::Result(result) => Ok(result),
        ResponseOutcome::Error(error) => Err(RpcClientError::from_error_value(error)),
    }
}

/// Callable handle for one server method
#[derive(Clone)]
pub struct MethodProxy<'a> {
    client: &'a RpcClient,
    name: String,
}

impl MethodProxy<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn call(&self, params: Vec<Value>) -> RpcClientResult<Value> {
        self.client.request(&self.name, params).await
    }

    /// Call and deserialize the result
    pub async fn call_as<T: DeserializeOwned>(&self, params: Vec<Value>) -> RpcClientResult<T> {
        let result = self.call(params).await?;
        Ok(serde_json::from_value(result)?)
    }
}

/// Builder for [`RpcClient`]
pub struct RpcClientBuilder {
    transport: Option<Arc<dyn ClientTransport>>,
    config: Option<ClientConfig>,
    id_generator: Option<IdGenerator>,
}

impl RpcClientBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            config: None,
            id_generator: None,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn ClientTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_id_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> Option<RequestId> + Send + Sync + 'static,
    {
        self.id_generator = Some(Arc::new(generator));
        self
    }

    pub fn build(self) -> RpcClientResult<RpcClient> {
        let transport = self
            .transport
            .ok_or_else(|| RpcClientError::config("Transport must be set before building client"))?;
        let mut client = RpcClient::new(transport, self.config.unwrap_or_default());
        if let Some(generator) = self.id_generator {
            client.id_generator = generator;
        }
        Ok(client)
    }

    /// Build, then register the server's methods when `auto_register` is on.
    /// A failed registration is logged and does not fail the build.
    pub async fn connect(self) -> RpcClientResult<RpcClient> {
        let client = self.build()?;
        if client.config.auto_register {
            match client.auto_register().await {
                Ok(names) => info!(count = names.len(), "Registered server methods"),
                Err(e) => warn!(error = %e, "Could not register server methods"),
            }
        }
        Ok(client)
    }
}

impl Default for RpcClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use linerpc_json_rpc_server::{Dispatcher, HandlerError};
    use linerpc_transport::{LoopbackTransport, TransportError, TransportResult};
    use parking_lot::Mutex;
    use serde_json::json;

    /// Records envelopes and answers with a fixed response
    struct Scripted {
        response: Value,
        seen: Mutex<Vec<Value>>,
    }

    impl Scripted {
        fn new(response: Value) -> Arc<Self> {
            Arc::new(Self {
                response,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ClientTransport for Scripted {
        async fn request(&self, envelope: Value) -> TransportResult<Value> {
            self.seen.lock().push(envelope);
            Ok(self.response.clone())
        }

        async fn shutdown(&self) -> TransportResult<()> {
            Ok(())
        }
    }

    fn calculator() -> Arc<dyn ClientTransport> {
        let dispatcher = Dispatcher::new();
        dispatcher.register_blocking("add", |params| {
            Ok(json!(params.iter().filter_map(Value::as_i64).sum::<i64>()))
        });
        dispatcher.register_blocking("fail", |_| Err(HandlerError::exception("nope")));
        Arc::new(LoopbackTransport::new(Arc::new(dispatcher)))
    }

    #[tokio::test]
    async fn test_request_builds_envelope_with_sequential_ids() {
        let transport = Scripted::new(json!({"jsonrpc": "2.0", "id": 1, "result": 42}));
        let client = RpcClient::builder()
            .with_transport(transport.clone())
            .build()
            .unwrap();

        assert_eq!(client.request("answer", vec![json!(1)]).await.unwrap(), json!(42));
        client.request("answer", vec![]).await.unwrap();

        let seen = transport.seen.lock();
        assert_eq!(
            seen[0],
            json!({"jsonrpc": "2.0", "method": "answer", "params": [1], "id": 1})
        );
        assert_eq!(seen[1]["id"], json!(2));
    }

    #[tokio::test]
    async fn test_response_interpretation() {
        assert_eq!(interpret_response(json!({"id": 1, "result": null})).unwrap(), Value::Null);
        assert_eq!(
            interpret_response(json!({"id": 1, "error": null, "result": 3})).unwrap(),
            json!(3)
        );
        for malformed in [
            json!("oops"),
            json!({"id": 1}),
            json!({"id": 1, "result": 3, "error": {"code": -32603, "message": "boom"}}),
        ] {
            assert!(matches!(
                interpret_response(malformed),
                Err(RpcClientError::InvalidResponse(_))
            ));
        }
        assert!(matches!(
            interpret_response(json!({"error": {"code": -32601, "message": "missing"}})),
            Err(RpcClientError::ServerError { code: Some(-32601), .. })
        ));
        assert!(matches!(
            interpret_response(json!({"error": [1, 2]})),
            Err(RpcClientError::ErrorPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_id_sends_nothing() {
        let transport = Scripted::new(json!({"result": 1}));
        let client = RpcClient::builder()
            .with_transport(transport.clone())
            .with_id_generator(|| None)
            .build()
            .unwrap();

        let error = client.request("x", vec![]).await.unwrap_err();
        assert!(matches!(error, RpcClientError::MissingRequestId));
        assert!(transport.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_custom_id_generator_and_notify() {
        let transport = Scripted::new(Value::Null);
        let client = RpcClient::builder()
            .with_transport(transport.clone())
            .with_id_generator(|| Some(RequestId::from("fixed")))
            .build()
            .unwrap();

        client.notify("log", vec![json!("hello")]).await.unwrap();
        let _ = client.request("x", vec![]).await;

        let seen = transport.seen.lock();
        assert!(seen[0].get("id").is_none());
        assert_eq!(seen[1]["id"], json!("fixed"));
    }

    #[tokio::test]
    async fn test_build_requires_transport() {
        assert!(matches!(
            RpcClientBuilder::new().build(),
            Err(RpcClientError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_auto_registers_proxies() {
        let client = RpcClient::builder()
            .with_transport(calculator())
            .connect()
            .await
            .unwrap();

        assert_eq!(
            client.registered_methods(),
            vec!["add", "fail", "rpc.methodList"]
        );
        let add = client.method("add").unwrap();
        assert_eq!(add.name(), "add");
        let sum: i64 = add.call_as(vec![json!(2), json!(5)]).await.unwrap();
        assert_eq!(sum, 7);

        let error = client.method("fail").unwrap().call(vec![]).await.unwrap_err();
        assert_eq!(error.error_code(), Some(-32603));
        assert!(matches!(client.method("nope"), Err(RpcClientError::UnknownMethod(_))));
    }

    #[tokio::test]
    async fn test_connect_without_auto_register() {
        let client = RpcClient::builder()
            .with_transport(calculator())
            .with_config(ClientConfig {
                auto_register: false,
            })
            .connect()
            .await
            .unwrap();
        assert!(client.registered_methods().is_empty());

        client.register(["add"]);
        assert!(client.method("add").is_ok());
    }

    #[tokio::test]
    async fn test_connect_tolerates_registration_failure() {
        let transport = Scripted::new(json!({"id": 1, "result": "not a list"}));
        let client = RpcClient::builder()
            .with_transport(transport)
            .connect()
            .await
            .unwrap();
        assert!(client.registered_methods().is_empty());
    }

    #[tokio::test]
    async fn test_transport_errors_pass_through() {
        let client = RpcClient::builder()
            .with_transport(calculator())
            .build()
            .unwrap();
        client.shutdown().await.unwrap();
        let error = client.request("add", vec![]).await.unwrap_err();
        assert!(matches!(error, RpcClientError::Transport(TransportError::Shutdown)));
    }
}
