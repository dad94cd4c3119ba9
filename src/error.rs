//! Error types for the agent components.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find config directory")]
    NoConfigDir,

    #[error("error loading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("error parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid directory format")]
    InvalidDirectory,

    #[error("error validating config: {field} {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("error serializing config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("error writing config: {0}")]
    Write(std::io::Error),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Log store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open log store at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt log store entry on line {line}: {source}")]
    Corrupt {
        line: usize,
        source: serde_json::Error,
    },

    #[error("failed to insert log entry into log store: {0}")]
    Write(String),

    #[error("log store is closed")]
    Closed,
}

/// Change source errors.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no matches found")]
    NoChanges,

    #[error("error scanning {directory}: {message}")]
    Scan { directory: String, message: String },
}

/// File change tracker errors.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("error querying file changes: {0}")]
    Query(#[source] SourceError),

    #[error("error writing log: {0}")]
    Write(#[source] StoreError),

    #[error("error loading from log store: {0}")]
    Read(#[source] StoreError),
}

/// Command executor errors.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("no command provided")]
    NoCommand,

    #[error("no command provided after sudo")]
    NoCommandAfterSudo,

    #[error("execution blocked: command: {0} is not whitelisted")]
    NotWhitelisted(String),

    #[error("error executing command: {0}")]
    Execution(String),

    #[error("command queue is closed")]
    QueueClosed,
}

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to start http server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("http server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("http server task failed: {0}")]
    Join(String),
}

/// Logs API client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to create HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("{0}")]
    Request(#[source] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response body: {0}")]
    Decode(String),
}

/// Agent lifecycle errors. These are what the UI shows after `Error: `.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent is already running")]
    AlreadyRunning,

    #[error("agent is not running")]
    NotRunning,

    #[error("error loading config: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to open log store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to close log store: {0}")]
    StoreClose(#[source] StoreError),

    #[error("failed to start http server: {0}")]
    Server(#[from] ServerError),

    #[error("failed to stop command executor: {0}")]
    Executor(#[from] ExecutorError),
}
