use std::{collections::BTreeSet, env, net::SocketAddr};

use thiserror::Error;

use crate::auth::RequestGuard;

pub const DEFAULT_MCP_PATH: &str = "/mcp";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
pub const DEFAULT_BIND_PORT: u16 = 8080;
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Which browser origins may talk to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsPolicy {
    /// Any origin; responses carry `Access-Control-Allow-Origin: *`.
    Any,
    /// Only the listed origins; any other `Origin` is rejected with 403.
    AllowList(BTreeSet<String>),
}

impl CorsPolicy {
    pub fn allow_list<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllowList(origins.into_iter().map(Into::into).collect())
    }

    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value == "*" {
            return Self::Any;
        }

        Self::allow_list(
            value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty()),
        )
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self::Any
    }
}

#[derive(Clone)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
    pub bind_addr: String,
    pub bind_port: u16,
    pub path: String,
    pub cors: CorsPolicy,
    pub max_body_bytes: usize,
    pub guard: Option<RequestGuard>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("bind_addr", &self.bind_addr)
            .field("bind_port", &self.bind_port)
            .field("path", &self.path)
            .field("cors", &self.cors)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("guard", &self.guard.is_some())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("MCP_MAX_BODY_BYTES must be a positive integer")]
    InvalidBodyLimit,
    #[error("invalid bind address or port")]
    InvalidSocket,
    #[error("MCP path `{0}` cannot be served literally")]
    InvalidPath(String),
    #[error("server name and version must not be empty")]
    MissingIdentity,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            bind_port: DEFAULT_BIND_PORT,
            path: DEFAULT_MCP_PATH.to_string(),
            cors: CorsPolicy::Any,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            guard: None,
        }
    }
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn with_bind(mut self, bind_addr: impl Into<String>, bind_port: u16) -> Self {
        self.bind_addr = bind_addr.into();
        self.bind_port = bind_port;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = normalize_path(&path.into());
        self
    }

    pub fn with_cors(mut self, cors: CorsPolicy) -> Self {
        self.cors = cors;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn with_guard(mut self, guard: RequestGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let name = non_empty_var("MCP_SERVER_NAME").unwrap_or(defaults.name);
        let version = non_empty_var("MCP_SERVER_VERSION").unwrap_or(defaults.version);
        let bind_addr = non_empty_var("BIND_ADDR").unwrap_or(defaults.bind_addr);
        let bind_port = non_empty_var("BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(defaults.bind_port);
        let path = non_empty_var("MCP_PATH")
            .map(|value| normalize_path(&value))
            .unwrap_or(defaults.path);
        let cors = non_empty_var("MCP_ALLOWED_ORIGINS")
            .map(|value| CorsPolicy::parse(&value))
            .unwrap_or_default();
        let max_body_bytes = non_empty_var("MCP_MAX_BODY_BYTES")
            .map(|value| {
                value
                    .parse::<usize>()
                    .ok()
                    .filter(|limit| *limit > 0)
                    .ok_or(ConfigError::InvalidBodyLimit)
            })
            .transpose()?
            .unwrap_or(defaults.max_body_bytes);

        let config = Self {
            name,
            version,
            bind_addr,
            bind_port,
            path,
            cors,
            max_body_bytes,
            guard: None,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() || self.version.trim().is_empty() {
            return Err(ConfigError::MissingIdentity);
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::InvalidBodyLimit);
        }
        validate_path(&self.path)?;
        let _ = self.bind_socket()?;
        Ok(())
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

/// Prefixes `/` when missing. Used for both the MCP path and custom routes.
pub fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn validate_path(path: &str) -> Result<(), ConfigError> {
    let literal = path.starts_with('/')
        && !path.contains(['{', '}', '*', '?', '#'])
        && !path.split('/').any(|segment| segment.starts_with(':'));

    if literal {
        Ok(())
    } else {
        Err(ConfigError::InvalidPath(path.to_string()))
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
