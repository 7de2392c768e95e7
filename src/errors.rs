use std::{io, net::SocketAddr};

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::config::ConfigError;

/// JSON-RPC error codes emitted (or reserved) by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    NotInitialized,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::NotInitialized => -32002,
        }
    }
}

/// A failure expressed inside the JSON-RPC envelope (HTTP status stays 200).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            format!("Method not found: {method}"),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

/// Rejections raised before the JSON-RPC layer is reached.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Forbidden")]
    Forbidden,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not Found")]
    NotFound,
    #[error("Method Not Allowed")]
    MethodNotAllowed,
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        };

        let mut response = (
            status,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )],
            self.to_string(),
        )
            .into_response();

        if matches!(self, Self::MethodNotAllowed) {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("POST, OPTIONS"));
        }

        response
    }
}

/// Registration, configuration and lifecycle failures. These are reported
/// synchronously to the caller and never swallowed.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("tool name must not be empty")]
    InvalidToolName,
    #[error("tool `{0}` is already registered")]
    DuplicateTool(String),
    #[error("route {method} {path} is already registered")]
    DuplicateRoute { method: String, path: String },
    #[error("custom route path `{0}` conflicts with the MCP endpoint path")]
    PathConflict(String),
    #[error("transport is already started")]
    AlreadyStarted,
    #[error("transport is not started")]
    NotStarted,
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("transport failed: {0}")]
    Serve(#[source] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid input schema for tool `{tool}`: {message}")]
    Schema { tool: String, message: String },
}
