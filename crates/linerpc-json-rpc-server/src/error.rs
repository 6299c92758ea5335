use serde_json::{Map, Value};

use crate::error_codes;

/// The fixed JSON-RPC error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    /// Reserved; the dispatcher never produces it
    InvalidParams,
    InternalError,
}

impl JsonRpcErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            JsonRpcErrorCode::ParseError => error_codes::PARSE_ERROR,
            JsonRpcErrorCode::InvalidRequest => error_codes::INVALID_REQUEST,
            JsonRpcErrorCode::MethodNotFound => error_codes::METHOD_NOT_FOUND,
            JsonRpcErrorCode::InvalidParams => error_codes::INVALID_PARAMS,
            JsonRpcErrorCode::InternalError => error_codes::INTERNAL_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            JsonRpcErrorCode::ParseError => "Parse error",
            JsonRpcErrorCode::InvalidRequest => "Invalid Request",
            JsonRpcErrorCode::MethodNotFound => "Method not found",
            JsonRpcErrorCode::InvalidParams => "Invalid params",
            JsonRpcErrorCode::InternalError => "Internal error",
        }
    }
}

/// JSON-RPC error payload.
///
/// Besides `code`, `message` and `data`, a payload may carry arbitrary extra
/// members (for example a diagnostic `stack`); they sit beside the standard
/// ones in the wire object.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
    pub fields: Map<String, Value>,
}

impl JsonRpcErrorObject {
    pub fn new(code: JsonRpcErrorCode, message: Option<String>, data: Option<Value>) -> Self {
        Self {
            code: code.code(),
            message: message.unwrap_or_else(|| code.message().to_string()),
            data,
            fields: Map::new(),
        }
    }

    pub fn parse_error() -> Self {
        Self::new(
            JsonRpcErrorCode::ParseError,
            Some("Did not receive valid JSON-RPC data.".to_string()),
            None,
        )
    }

    pub fn invalid_request() -> Self {
        Self::new(
            JsonRpcErrorCode::InvalidRequest,
            Some("Did not receive valid JSON-RPC data.".to_string()),
            None,
        )
    }

    pub fn method_not_found() -> Self {
        Self::new(
            JsonRpcErrorCode::MethodNotFound,
            Some("Requested method does not exist.".to_string()),
            None,
        )
    }

    /// Attach an extra top-level member to the payload
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Wire form; standard members win over same-named extra fields
    pub fn to_value(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("code".to_string(), Value::from(self.code));
        object.insert("message".to_string(), Value::String(self.message.clone()));
        if let Some(data) = &self.data {
            object.insert("data".to_string(), data.clone());
        }
        Value::Object(object)
    }
}
