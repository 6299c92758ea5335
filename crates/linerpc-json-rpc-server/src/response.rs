use serde_json::Value;

use crate::error::JsonRpcErrorObject;

/// Exactly one of `result` or `error`
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    Result(Value),
    Error(Value),
}

/// Why a JSON value could not be read as a response envelope
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseShapeError {
    #[error("response is not a JSON object")]
    NotAnObject,
    #[error("response carries neither result nor error")]
    MissingOutcome,
    #[error("response carries both result and error")]
    BothOutcomes,
}

/// A JSON-RPC response envelope.
///
/// `version` mirrors the request's `jsonrpc` member and is omitted when the
/// request had none. `id` mirrors the request id, `null` when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcResponse {
    pub version: Option<Value>,
    pub id: Value,
    pub outcome: ResponseOutcome,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            version: None,
            id,
            outcome: ResponseOutcome::Result(result),
        }
    }

    pub fn error(id: Value, error: Value) -> Self {
        Self {
            version: None,
            id,
            outcome: ResponseOutcome::Error(error),
        }
    }

    pub fn from_error_object(id: Value, error: &JsonRpcErrorObject) -> Self {
        Self::error(id, error.to_value())
    }

    /// Parse-Error envelope for an unparseable frame (`id` is null)
    pub fn parse_error() -> Self {
        Self::from_error_object(Value::Null, &JsonRpcErrorObject::parse_error())
            .with_version(Some(Value::String(crate::JSONRPC_VERSION.to_string())))
    }

    pub fn with_version(mut self, version: Option<Value>) -> Self {
        self.version = version;
        self
    }

    /// Read a received envelope. An `"error": null` member counts as absent.
    pub fn from_value(value: Value) -> Result<Self, ResponseShapeError> {
        let Value::Object(mut object) = value else {
            return Err(ResponseShapeError::NotAnObject);
        };
        let version = object.remove("jsonrpc");
        let id = object.remove("id").unwrap_or(Value::Null);
        let error = object.remove("error").filter(|error| !error.is_null());
        let outcome = match (object.remove("result"), error) {
            (Some(_), Some(_)) => return Err(ResponseShapeError::BothOutcomes),
            (Some(result), None) => ResponseOutcome::Result(result),
            (None, Some(error)) => ResponseOutcome::Error(error),
            (None, None) => return Err(ResponseShapeError::MissingOutcome),
        };
        Ok(Self {
            version,
            id,
            outcome,
        })
    }

    pub fn into_value(self) -> Value {
        let mut object = serde_json::Map::new();
        if let Some(version) = self.version {
            object.insert("jsonrpc".to_string(), version);
        }
        object.insert("id".to_string(), self.id);
        match self.outcome {
            ResponseOutcome::Result(result) => object.insert("result".to_string(), result),
            ResponseOutcome::Error(error) => object.insert("error".to_string(), error),
        };
        Value::Object(object)
    }
}
