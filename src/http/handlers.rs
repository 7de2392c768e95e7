//! Axum HTTP handlers
//!
//! The JSON-RPC endpoint, the 405 responder for the MCP path and the fallback
//! that serves custom routes or 404.

use axum::{
    body::to_bytes,
    extract::{Request, State},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, error};

use crate::{
    errors::{RpcError, TransportError},
    mcp::{rpc::JsonRpcResponse, server::handle_json_rpc_body},
    AppState,
};

pub async fn mcp_endpoint(State(state): State<AppState>, request: Request) -> Response {
    let body = match to_bytes(request.into_body(), state.max_body_bytes).await {
        Ok(body) => body,
        Err(err) => {
            error!(error = %err, "failed to read request body");
            let failure = RpcError::internal(format!("Internal error: {err}"));
            return Json(JsonRpcResponse::error(None, &failure)).into_response();
        }
    };

    Json(handle_json_rpc_body(&state, &body).await).into_response()
}

pub async fn method_not_allowed() -> TransportError {
    TransportError::MethodNotAllowed
}

pub async fn custom_route(State(state): State<AppState>, request: Request) -> Response {
    let handler = state.routes.get(request.method(), request.uri().path());
    match handler {
        Some(handler) => {
            debug!(method = %request.method(), path = %request.uri().path(), "custom route");
            handler.handle(request).await
        }
        None => TransportError::NotFound.into_response(),
    }
}
