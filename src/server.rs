//! Server facade and transport lifecycle
//!
//! [`McpServer`] owns the tool and route registries and the listener task.
//! Registration may happen before or after [`McpServer::start`]; the router
//! reads both registries on every request.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use axum::{http::Method, Router};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tracing::{error, info, warn};

use crate::{
    build_app,
    config::ServerConfig,
    domain::{
        routes::{RouteHandler, RouteRegistry},
        tools::{ToolDefinition, ToolRegistry},
    },
    errors::ServerError,
    hooks::{HookSink, ServerHooks},
    AppState,
};

enum Transport {
    Stopped,
    Starting,
    Running(RunningTransport),
}

struct RunningTransport {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct McpServer {
    config: ServerConfig,
    tools: Arc<ToolRegistry>,
    routes: Arc<RouteRegistry>,
    hooks: HookSink,
    transport: Mutex<Transport>,
}

impl McpServer {
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        Self::build(config, HookSink::none())
    }

    pub fn with_hooks(
        config: ServerConfig,
        hooks: Arc<dyn ServerHooks>,
    ) -> Result<Self, ServerError> {
        Self::build(config, HookSink::new(hooks))
    }

    fn build(config: ServerConfig, hooks: HookSink) -> Result<Self, ServerError> {
        config.validate()?;

        Ok(Self {
            tools: Arc::new(ToolRegistry::new(hooks.clone())),
            routes: Arc::new(RouteRegistry::new()),
            hooks,
            config,
            transport: Mutex::new(Transport::Stopped),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn register_tool(&self, definition: ToolDefinition) -> Result<(), ServerError> {
        self.tools.register(definition)
    }

    pub fn register_route<H>(&self, method: Method, path: &str, handler: H) -> Result<(), ServerError>
    where
        H: RouteHandler + 'static,
    {
        self.routes.register(method, path, Arc::new(handler))
    }

    /// Builds the full HTTP application without binding a socket.
    pub fn router(&self) -> Result<Router, ServerError> {
        if self.routes.contains_path(&self.config.path) {
            return Err(ServerError::PathConflict(self.config.path.clone()));
        }

        Ok(build_app(AppState::new(
            &self.config,
            Arc::clone(&self.tools),
            Arc::clone(&self.routes),
            self.hooks.clone(),
        )))
    }

    /// Binds the configured address and serves in a background task.
    /// Returns the bound address, which differs from the configured one when
    /// the port is 0.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        {
            let mut transport = self.lock_transport();
            if !matches!(*transport, Transport::Stopped) {
                return Err(ServerError::AlreadyStarted);
            }
            *transport = Transport::Starting;
        }

        match self.spawn_transport().await {
            Ok(running) => {
                let local_addr = running.local_addr;
                *self.lock_transport() = Transport::Running(running);
                info!(addr = %local_addr, path = %self.config.path, "MCP server listening");
                Ok(local_addr)
            }
            Err(err) => {
                *self.lock_transport() = Transport::Stopped;
                error!(error = %err, "failed to start MCP server");
                self.hooks.server_error(&err);
                Err(err)
            }
        }
    }

    async fn spawn_transport(&self) -> Result<RunningTransport, ServerError> {
        let app = self.router()?;
        let addr = self.config.bind_socket()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let (shutdown, shutdown_signal) = oneshot::channel::<()>();
        let hooks = self.hooks.clone();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_signal.await;
                })
                .await;

            if let Err(source) = served {
                let err = ServerError::Serve(source);
                error!(error = %err, "MCP server stopped unexpectedly");
                hooks.server_error(&err);
            }
        });

        Ok(RunningTransport {
            local_addr,
            shutdown,
            task,
        })
    }

    /// Stops accepting connections and waits for in-flight requests.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let running = {
            let mut transport = self.lock_transport();
            match std::mem::replace(&mut *transport, Transport::Stopped) {
                Transport::Running(running) => running,
                other => {
                    *transport = other;
                    return Err(ServerError::NotStarted);
                }
            }
        };

        let _ = running.shutdown.send(());
        if let Err(err) = running.task.await {
            warn!(error = %err, "server task ended abnormally");
        }

        info!(addr = %running.local_addr, "MCP server stopped");
        Ok(())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.lock_transport() {
            Transport::Running(running) => Some(running.local_addr),
            Transport::Stopped | Transport::Starting => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.local_addr().is_some()
    }

    fn lock_transport(&self) -> MutexGuard<'_, Transport> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
