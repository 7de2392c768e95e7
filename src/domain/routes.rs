//! Custom HTTP routes served next to the MCP endpoint
//!
//! Handlers receive the raw request and own the response entirely; JSON-RPC
//! semantics do not apply to them.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use axum::{extract::Request, http::Method, response::Response};

use crate::{config::normalize_path, errors::ServerError};

#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, request: Request) -> Response;
}

#[async_trait]
impl<F, Fut> RouteHandler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    async fn handle(&self, request: Request) -> Response {
        self(request).await
    }
}

/// `(method, path)` table. Paths are stored normalized with a leading `/`.
#[derive(Default)]
pub struct RouteRegistry {
    routes: RwLock<HashMap<(Method, String), Arc<dyn RouteHandler>>>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        method: Method,
        path: &str,
        handler: Arc<dyn RouteHandler>,
    ) -> Result<(), ServerError> {
        let path = normalize_path(path);
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let key = (method, path);
        if routes.contains_key(&key) {
            let (method, path) = key;
            return Err(ServerError::DuplicateRoute {
                method: method.to_string(),
                path,
            });
        }

        routes.insert(key, handler);
        Ok(())
    }

    pub fn get(&self, method: &Method, path: &str) -> Option<Arc<dyn RouteHandler>> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(method.clone(), path.to_string()))
            .cloned()
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .any(|(_, registered)| registered == path)
    }
}
