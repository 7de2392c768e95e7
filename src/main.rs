use axum::{
    extract::Request,
    http::Method,
    response::{IntoResponse, Response},
    Json,
};
use mcp_http_tools::{logging, Content, McpServer, ServerConfig, ToolDefinition};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// Input of the `echo` demo tool.
#[derive(Debug, Deserialize, JsonSchema)]
struct EchoInput {
    /// Text returned verbatim.
    text: String,
}

async fn health(_request: Request) -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = ServerConfig::from_env()?;
    let server = McpServer::new(config)?;

    let echo = ToolDefinition::typed::<EchoInput, _, _>("echo", |input| async move {
        Ok(vec![Content::text(input.text)])
    })?
    .with_description("Echo the given text back to the caller");
    server.register_tool(echo)?;
    server.register_route(Method::GET, "/health", health)?;

    let addr = server.start().await?;
    info!(%addr, path = %server.config().path, "server starting");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    server.stop().await?;
    Ok(())
}
