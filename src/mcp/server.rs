//! The central Model Context Protocol engine
//!
//! Decodes the JSON-RPC envelope, dispatches `initialize`, `tools/list`,
//! `tools/call` and `ping`, and renders every outcome as a JSON-RPC response.

use rust_mcp_sdk::schema::{
    Implementation, InitializeResult, ServerCapabilities, ServerCapabilitiesTools,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::{
    domain::tools::{handle_tools_call, ToolDescriptor},
    errors::RpcError,
    mcp::rpc::{decode_request, JsonRpcRequest, JsonRpcResponse, Params},
    AppState,
};

/// Decodes a raw request body and dispatches it.
pub async fn handle_json_rpc_body(state: &AppState, body: &[u8]) -> JsonRpcResponse {
    let payload: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(err) => {
            return JsonRpcResponse::error(None, &RpcError::parse_error(format!("Parse error: {err}")))
        }
    };

    match decode_request(payload) {
        Ok(request) => handle_json_rpc_request(state, request).await,
        Err(envelope) => JsonRpcResponse::error(envelope.id, &envelope.error),
    }
}

pub async fn handle_json_rpc_request(state: &AppState, request: JsonRpcRequest) -> JsonRpcResponse {
    let JsonRpcRequest {
        id, method, params, ..
    } = request;
    let audit_params = redact_audit_params(params.as_ref());

    let outcome = match method.as_str() {
        "initialize" => handle_initialize(state, params),
        "tools/list" => Ok(handle_tools_list(state)),
        "tools/call" => handle_tools_call(state, params).await,
        "ping" => Ok(json!({ "status": "ok" })),
        _ => Err(RpcError::method_not_found(&method)),
    };

    info!(
        method = %method,
        params = %audit_params,
        outcome = if outcome.is_ok() { "success" } else { "failure" },
        "mcp action audited"
    );

    match outcome {
        Ok(result) => JsonRpcResponse::result(id, result),
        Err(error) => JsonRpcResponse::error(id, &error),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    protocol_version: String,
    client_info: ClientInfo,
    #[serde(default)]
    capabilities: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ClientInfo {
    name: String,
    version: String,
}

fn parse_initialize_params(params: Option<Params>) -> Result<InitializeParams, String> {
    let raw = match params {
        Some(Params::Object(object)) => Value::Object(object),
        Some(Params::Array(_)) => return Err("params must be an object".to_string()),
        None => return Err("params are required".to_string()),
    };

    let parsed: InitializeParams = serde_json::from_value(raw).map_err(|err| err.to_string())?;

    let empty = [
        ("protocolVersion", &parsed.protocol_version),
        ("clientInfo.name", &parsed.client_info.name),
        ("clientInfo.version", &parsed.client_info.version),
    ]
    .into_iter()
    .find(|(_, value)| value.is_empty());
    if let Some((field, _)) = empty {
        return Err(format!("{field} must not be empty"));
    }

    if parsed
        .capabilities
        .as_ref()
        .is_some_and(|capabilities| !capabilities.is_object() && !capabilities.is_null())
    {
        return Err("capabilities must be an object".to_string());
    }

    Ok(parsed)
}

/// Malformed initialize payloads are protocol-level errors, hence ParseError.
fn handle_initialize(state: &AppState, params: Option<Params>) -> Result<Value, RpcError> {
    let params = parse_initialize_params(params)
        .map_err(|detail| RpcError::parse_error(format!("Invalid initialize params: {detail}")))?;

    state.hooks.client_connected(
        &params.client_info.name,
        &params.client_info.version,
        &params.protocol_version,
    );
    info!(
        client = %params.client_info.name,
        client_version = %params.client_info.version,
        protocol_version = %params.protocol_version,
        "client connected"
    );

    let initialize_result = InitializeResult {
        server_info: Implementation {
            name: state.server_name.to_string(),
            version: state.server_version.to_string(),
            title: None,
            description: None,
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools { list_changed: None }),
            ..Default::default()
        },
        protocol_version: params.protocol_version,
        instructions: None,
        meta: None,
    };

    Ok(serde_json::to_value(initialize_result).expect("initialize result serialization"))
}

fn handle_tools_list(state: &AppState) -> Value {
    state.hooks.tools_list_requested();

    let tools: Vec<ToolDescriptor> = state
        .tools
        .list()
        .iter()
        .map(|tool| tool.descriptor())
        .collect();

    json!({ "tools": tools })
}

const SECRET_KEY_FRAGMENTS: [&str; 7] = [
    "token",
    "secret",
    "password",
    "credential",
    "authorization",
    "bearer",
    "apikey",
];

const MASK: &str = "[redacted]";

/// Copy of the request params with secret-looking fields masked, for the audit log.
pub fn redact_audit_params(params: Option<&Params>) -> Value {
    let mut audited = match params {
        Some(Params::Object(map)) => Value::Object(map.clone()),
        Some(Params::Array(items)) => Value::Array(items.clone()),
        None => return Value::Null,
    };
    mask_secrets(&mut audited);
    audited
}

fn mask_secrets(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                if looks_secret(key) {
                    *item = Value::String(MASK.to_string());
                } else {
                    mask_secrets(item);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_secrets),
        _ => {}
    }
}

/// Matches on the key folded to lowercase alphanumerics, so `api_key`,
/// `API-Key` and `clientSecret` all count.
fn looks_secret(key: &str) -> bool {
    let folded: String = key
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    SECRET_KEY_FRAGMENTS
        .iter()
        .any(|fragment| folded.contains(fragment))
}
