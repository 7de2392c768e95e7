//! Tool definitions, the tool registry and the `tools/call` pipeline

use std::{
    any::Any,
    collections::HashMap,
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{Arc, PoisonError, RwLock},
    time::Instant,
};

use futures::FutureExt;
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    domain::content::Content,
    errors::{RpcError, ServerError},
    hooks::HookSink,
    mcp::rpc::Params,
    schema::{TypedSchema, ValidationDiagnostics, Validator},
    AppState,
};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type ToolResult = Result<Vec<Content>, BoxError>;

type ToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

const HANDLER_FAILURE_FALLBACK: &str = "Tool execution failed";

/// Why a tool call did not produce content.
#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(ValidationDiagnostics),
    #[error("{0}")]
    Handler(BoxError),
    #[error("{0}")]
    Panicked(String),
    #[error("tool call cancelled before completion")]
    Cancelled,
}

impl ToolCallError {
    /// Message reported to the client as the JSON-RPC error message.
    pub fn client_message(&self) -> String {
        let message = match self {
            Self::InvalidArguments(diagnostics) => diagnostics.to_string(),
            Self::Handler(error) => error.to_string(),
            Self::Panicked(message) => message.clone(),
            Self::Cancelled => self.to_string(),
        };

        if message.trim().is_empty() {
            HANDLER_FAILURE_FALLBACK.to_string()
        } else {
            message
        }
    }
}

/// Type-erased validator plus handler. `prepare` validates and returns a
/// not-yet-polled invocation.
trait CallableTool: Send + Sync {
    fn input_schema(&self) -> Value;

    fn prepare(&self, arguments: &Value) -> Result<ToolFuture, ValidationDiagnostics>;
}

struct BoundTool<V, F> {
    validator: V,
    handler: F,
}

impl<V, F, Fut> CallableTool for BoundTool<V, F>
where
    V: Validator,
    F: Fn(V::Output) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult> + Send + 'static,
{
    fn input_schema(&self) -> Value {
        self.validator.json_schema()
    }

    fn prepare(&self, arguments: &Value) -> Result<ToolFuture, ValidationDiagnostics> {
        let input = self.validator.validate(arguments)?;
        Ok(Box::pin((self.handler)(input)))
    }
}

/// A named, schema-validated tool. Immutable once built.
#[derive(Clone)]
pub struct ToolDefinition {
    name: String,
    description: Option<String>,
    callable: Arc<dyn CallableTool>,
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl ToolDefinition {
    pub fn new<V, F, Fut>(name: impl Into<String>, validator: V, handler: F) -> Self
    where
        V: Validator,
        F: Fn(V::Output) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            callable: Arc::new(BoundTool { validator, handler }),
        }
    }

    /// Builds the input schema from `T` with `schemars`.
    pub fn typed<T, F, Fut>(name: impl Into<String>, handler: F) -> Result<Self, ServerError>
    where
        T: JsonSchema + DeserializeOwned + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        let name = name.into();
        let validator = TypedSchema::<T>::new(&name).map_err(|message| ServerError::Schema {
            tool: name.clone(),
            message,
        })?;
        Ok(Self::new(name, validator, handler))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn input_schema(&self) -> Value {
        self.callable.input_schema()
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema(),
        }
    }
}

/// Entry of a `tools/list` result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

#[derive(Default)]
struct ToolTable {
    order: Vec<Arc<ToolDefinition>>,
    by_name: HashMap<String, usize>,
}

/// Insertion-ordered tool table, safe for concurrent reads and late writes.
#[derive(Default)]
pub struct ToolRegistry {
    table: RwLock<ToolTable>,
    hooks: HookSink,
}

impl ToolRegistry {
    pub fn new(hooks: HookSink) -> Self {
        Self {
            table: RwLock::default(),
            hooks,
        }
    }

    pub fn register(&self, definition: ToolDefinition) -> Result<(), ServerError> {
        if definition.name.trim().is_empty() {
            return Err(ServerError::InvalidToolName);
        }

        let name = definition.name.clone();
        {
            let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
            if table.by_name.contains_key(&name) {
                return Err(ServerError::DuplicateTool(name));
            }
            let index = table.order.len();
            table.order.push(Arc::new(definition));
            table.by_name.insert(name.clone(), index);
        }

        info!(tool = %name, "tool registered");
        self.hooks.tool_registered(&name);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolDefinition>> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table
            .by_name
            .get(name)
            .and_then(|index| table.order.get(*index))
            .cloned()
    }

    pub fn list(&self) -> Vec<Arc<ToolDefinition>> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .clone()
    }

    pub fn len(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Map<String, Value>>,
}

fn parse_call_params(params: Option<Params>) -> Result<CallToolParams, RpcError> {
    let invalid = |detail: String| RpcError::parse_error(format!("Invalid tools/call params: {detail}"));

    let raw = match params {
        Some(Params::Object(object)) => Value::Object(object),
        Some(Params::Array(_)) => return Err(invalid("params must be an object".to_string())),
        None => return Err(invalid("params are required".to_string())),
    };

    let call: CallToolParams =
        serde_json::from_value(raw).map_err(|err| invalid(err.to_string()))?;
    if call.name.trim().is_empty() {
        return Err(invalid("name must not be empty".to_string()));
    }

    Ok(call)
}

pub async fn handle_tools_call(state: &AppState, params: Option<Params>) -> Result<Value, RpcError> {
    let call = parse_call_params(params)?;

    let Some(tool) = state.tools.get(&call.name) else {
        return Err(RpcError::invalid_params(format!(
            "Tool not found: {}",
            call.name
        )));
    };

    let arguments = Value::Object(call.arguments.unwrap_or_default());
    let started_at = Instant::now();

    let invocation = match tool.callable.prepare(&arguments) {
        Ok(invocation) => invocation,
        Err(diagnostics) => {
            let message = format!("Invalid arguments for tool {}: {diagnostics}", call.name);
            let error = ToolCallError::InvalidArguments(diagnostics);
            state
                .hooks
                .tool_call_error(&call.name, &arguments, &error, started_at.elapsed());
            warn!(tool = %call.name, "tool arguments failed validation");
            return Err(RpcError::invalid_params(message));
        }
    };

    state.hooks.tool_call_started(&call.name, &arguments);

    let mut pending = PendingCall {
        state,
        name: &call.name,
        arguments: &arguments,
        started_at,
        settled: false,
    };
    let outcome = match AssertUnwindSafe(invocation).catch_unwind().await {
        Ok(Ok(content)) => Ok(content),
        Ok(Err(error)) => Err(ToolCallError::Handler(error)),
        Err(payload) => Err(ToolCallError::Panicked(panic_message(payload))),
    };
    pending.settled = true;
    let elapsed = started_at.elapsed();

    match outcome {
        Ok(content) => {
            info!(
                tool = %call.name,
                duration_ms = elapsed.as_millis(),
                items = content.len(),
                "tool call finished"
            );
            state
                .hooks
                .tool_call_finished(&call.name, &arguments, &content, elapsed);
            Ok(json!({ "content": content }))
        }
        Err(error) => {
            warn!(
                tool = %call.name,
                duration_ms = elapsed.as_millis(),
                error = %error,
                "tool call failed"
            );
            state
                .hooks
                .tool_call_error(&call.name, &arguments, &error, elapsed);
            Err(RpcError::internal(error.client_message()))
        }
    }
}

/// Reports a call whose request was dropped while the handler was running.
struct PendingCall<'a> {
    state: &'a AppState,
    name: &'a str,
    arguments: &'a Value,
    started_at: Instant,
    settled: bool,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let elapsed = self.started_at.elapsed();
        warn!(tool = %self.name, duration_ms = elapsed.as_millis(), "tool call cancelled");
        self.state.hooks.tool_call_error(
            self.name,
            self.arguments,
            &ToolCallError::Cancelled,
            elapsed,
        );
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&'static str>()
            .map(|message| (*message).to_string())
            .unwrap_or_else(|| HANDLER_FAILURE_FALLBACK.to_string()),
    }
}
