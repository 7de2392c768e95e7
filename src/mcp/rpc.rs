//! JSON-RPC 2.0 envelope types
//!
//! Decodes inbound requests (recovering the `id` when the envelope is
//! malformed) and renders success and error responses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::errors::RpcError;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JsonRpcVersion {
    #[serde(rename = "2.0")]
    V2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(Number),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Params {
    Object(Map<String, Value>),
    Array(Vec<Value>),
}

/// A decoded request. `id == None` marks a notification.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: JsonRpcVersion,
    #[serde(default)]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Params>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl JsonRpcResponse {
    pub fn result(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<RequestId>, error: &RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(ErrorObject {
                code: error.code.code(),
                message: error.message.clone(),
            }),
        }
    }
}

/// Envelope shape failure, carrying whatever id could be recovered.
#[derive(Debug)]
pub struct EnvelopeError {
    pub id: Option<RequestId>,
    pub error: RpcError,
}

pub fn decode_request(payload: Value) -> Result<JsonRpcRequest, EnvelopeError> {
    if !payload.is_object() {
        return Err(EnvelopeError {
            id: None,
            error: RpcError::parse_error("Invalid JSON-RPC request: expected a JSON object"),
        });
    }

    let recovered_id = payload.get("id").and_then(value_to_request_id);

    serde_json::from_value(payload).map_err(|err| EnvelopeError {
        id: recovered_id,
        error: RpcError::parse_error(format!("Invalid JSON-RPC request: {err}")),
    })
}

pub fn value_to_request_id(value: &Value) -> Option<RequestId> {
    match value {
        Value::String(id) => Some(RequestId::String(id.clone())),
        Value::Number(id) => Some(RequestId::Number(id.clone())),
        _ => None,
    }
}
