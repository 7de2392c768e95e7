use std::sync::Arc;

use axum::{middleware, routing::post, Router};

pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod hooks;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod schema;
pub mod server;

pub use config::{CorsPolicy, ServerConfig};
pub use domain::{
    content::Content,
    routes::RouteHandler,
    tools::{BoxError, ToolCallError, ToolDefinition, ToolResult},
};
pub use errors::ServerError;
pub use hooks::ServerHooks;
pub use schema::{TypedSchema, ValidationDiagnostics, Validator};
pub use server::McpServer;

use auth::RequestGuard;
use domain::{routes::RouteRegistry, tools::ToolRegistry};
use hooks::HookSink;

#[derive(Clone)]
pub struct AppState {
    pub server_name: Arc<str>,
    pub server_version: Arc<str>,
    pub mcp_path: Arc<str>,
    pub cors: Arc<CorsPolicy>,
    pub max_body_bytes: usize,
    pub guard: Option<RequestGuard>,
    pub tools: Arc<ToolRegistry>,
    pub routes: Arc<RouteRegistry>,
    pub hooks: HookSink,
}

impl AppState {
    pub fn new(
        config: &ServerConfig,
        tools: Arc<ToolRegistry>,
        routes: Arc<RouteRegistry>,
        hooks: HookSink,
    ) -> Self {
        Self {
            server_name: Arc::from(config.name.as_str()),
            server_version: Arc::from(config.version.as_str()),
            mcp_path: Arc::from(config.path.as_str()),
            cors: Arc::new(config.cors.clone()),
            max_body_bytes: config.max_body_bytes,
            guard: config.guard.clone(),
            tools,
            routes,
            hooks,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let mcp = Router::new()
        .route(
            &state.mcp_path,
            post(http::handlers::mcp_endpoint).fallback(http::handlers::method_not_allowed),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_guard,
        ));

    Router::new()
        .merge(mcp)
        .fallback(http::handlers::custom_route)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            http::cors::enforce_cors,
        ))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
