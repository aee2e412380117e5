//! Unified error handling for the Redis MCP server
//!
//! Connection failures are classified into a small taxonomy so that callers
//! (and ultimately the tool output) can tell a refused socket from a bad
//! password or a slow node. Lookup failures against the registry have their
//! own variants because they are not driver problems at all.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::pool::DecodeMode;

/// Classification of a failed connect or liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    /// Nothing listening, or the socket was reset during the handshake
    ConnectionRefused,
    /// Server rejected the credentials
    AuthenticationFailed,
    /// Connect or response deadline elapsed
    Timeout,
    /// Server answered with something the driver could not interpret
    MalformedResponse,
    /// Any other driver or cluster-level error
    Driver,
    /// Failure outside the driver (bad certificate file, etc.)
    Unclassified,
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectFailure::ConnectionRefused => write!(f, "Connection refused"),
            ConnectFailure::AuthenticationFailed => write!(f, "Authentication failed"),
            ConnectFailure::Timeout => write!(f, "Connection timed out"),
            ConnectFailure::MalformedResponse => write!(f, "Response error"),
            ConnectFailure::Driver => write!(f, "Redis error"),
            ConnectFailure::Unclassified => write!(f, "Unexpected error"),
        }
    }
}

/// A classified connection failure for one host and decode mode
#[derive(Debug, Clone, Error)]
#[error("{kind} for Redis server at {host_id} ({mode} mode): {detail}")]
pub struct ConnectError {
    pub kind: ConnectFailure,
    pub host_id: String,
    pub mode: DecodeMode,
    pub detail: String,
}

impl ConnectError {
    pub fn new<S: Into<String>, D: Into<String>>(
        kind: ConnectFailure,
        host_id: S,
        mode: DecodeMode,
        detail: D,
    ) -> Self {
        Self {
            kind,
            host_id: host_id.into(),
            mode,
            detail: detail.into(),
        }
    }

    /// Classify a driver error raised while building or probing a client
    pub fn from_redis(host_id: &str, mode: DecodeMode, err: &redis::RedisError) -> Self {
        Self::new(classify_redis_error(err), host_id, mode, err.to_string())
    }
}

/// Map a driver error onto the connection failure taxonomy
pub fn classify_redis_error(err: &redis::RedisError) -> ConnectFailure {
    use redis::ErrorKind;

    if err.is_connection_refusal() {
        return ConnectFailure::ConnectionRefused;
    }
    if err.is_timeout() {
        return ConnectFailure::Timeout;
    }
    if matches!(err.code(), Some("NOAUTH") | Some("WRONGPASS")) {
        return ConnectFailure::AuthenticationFailed;
    }

    match err.kind() {
        ErrorKind::AuthenticationFailed => ConnectFailure::AuthenticationFailed,
        ErrorKind::ResponseError | ErrorKind::TypeError => ConnectFailure::MalformedResponse,
        _ => ConnectFailure::Driver,
    }
}

/// Errors surfaced by the connection registry and its facade
#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("No Redis connections available. Use the 'connect' tool to establish a connection first.")]
    NoConnectionsAvailable,

    #[error("No connection found for host '{host_id}'. Available hosts: {available:?}")]
    HostNotFound {
        host_id: String,
        available: Vec<String>,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

impl PoolError {
    pub fn host_not_found<S: Into<String>>(host_id: S, available: Vec<String>) -> Self {
        PoolError::HostNotFound {
            host_id: host_id.into(),
            available,
        }
    }

    /// Classification of the underlying connect failure, if any
    pub fn connect_failure(&self) -> Option<ConnectFailure> {
        match self {
            PoolError::Connect(err) => Some(err.kind),
            _ => None,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid Redis URI: {0}")]
    InvalidUri(String),
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::IoError(err.to_string())
    }
}

/// Errors that stop a tool call before it reaches Redis
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}

impl ToolError {
    pub fn invalid_arguments<S: Into<String>, R: Into<String>>(tool: S, reason: R) -> Self {
        ToolError::InvalidArguments {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}
