//! Lifecycle hooks
//!
//! Observational callbacks fired at fixed points of the request pipeline.
//! Every method defaults to a no-op, so implementors override only what they
//! need. Hooks never influence the response: [`HookSink`] swallows panics.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};

use serde_json::Value;
use tracing::warn;

use crate::{
    domain::{content::Content, tools::ToolCallError},
    errors::ServerError,
};

#[allow(unused_variables)]
pub trait ServerHooks: Send + Sync {
    fn on_client_connected(&self, name: &str, version: &str, protocol_version: &str) {}

    fn on_tool_registered(&self, name: &str) {}

    /// Fired with the raw arguments, only once validation has passed.
    fn on_tool_call_started(&self, name: &str, arguments: &Value) {}

    fn on_tool_call_finished(
        &self,
        name: &str,
        arguments: &Value,
        content: &[Content],
        elapsed: Duration,
    ) {
    }

    fn on_tool_call_error(
        &self,
        name: &str,
        arguments: &Value,
        error: &ToolCallError,
        elapsed: Duration,
    ) {
    }

    fn on_tools_list_requested(&self) {}

    fn on_server_error(&self, error: &ServerError) {}
}

/// Shared, possibly empty, handle to the configured hooks.
#[derive(Clone, Default)]
pub struct HookSink {
    hooks: Option<Arc<dyn ServerHooks>>,
}

impl HookSink {
    pub fn new(hooks: Arc<dyn ServerHooks>) -> Self {
        Self { hooks: Some(hooks) }
    }

    pub fn none() -> Self {
        Self::default()
    }

    fn emit(&self, hook: &'static str, call: impl FnOnce(&dyn ServerHooks)) {
        let Some(hooks) = self.hooks.as_deref() else {
            return;
        };

        if catch_unwind(AssertUnwindSafe(|| call(hooks))).is_err() {
            warn!(hook, "lifecycle hook panicked; ignoring");
        }
    }

    pub fn client_connected(&self, name: &str, version: &str, protocol_version: &str) {
        self.emit("on_client_connected", |hooks| {
            hooks.on_client_connected(name, version, protocol_version)
        });
    }

    pub fn tool_registered(&self, name: &str) {
        self.emit("on_tool_registered", |hooks| hooks.on_tool_registered(name));
    }

    pub fn tool_call_started(&self, name: &str, arguments: &Value) {
        self.emit("on_tool_call_started", |hooks| {
            hooks.on_tool_call_started(name, arguments)
        });
    }

    pub fn tool_call_finished(
        &self,
        name: &str,
        arguments: &Value,
        content: &[Content],
        elapsed: Duration,
    ) {
        self.emit("on_tool_call_finished", |hooks| {
            hooks.on_tool_call_finished(name, arguments, content, elapsed)
        });
    }

    pub fn tool_call_error(
        &self,
        name: &str,
        arguments: &Value,
        error: &ToolCallError,
        elapsed: Duration,
    ) {
        self.emit("on_tool_call_error", |hooks| {
            hooks.on_tool_call_error(name, arguments, error, elapsed)
        });
    }

    pub fn tools_list_requested(&self) {
        self.emit("on_tools_list_requested", |hooks| {
            hooks.on_tools_list_requested()
        });
    }

    pub fn server_error(&self, error: &ServerError) {
        self.emit("on_server_error", |hooks| hooks.on_server_error(error));
    }
}
