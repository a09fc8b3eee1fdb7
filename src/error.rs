//! Error types for the host

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("routing error: {0}")]
    Routing(String),

    #[error("server '{0}' reported an error: {1}")]
    ServerError(String, String),

    #[error("timed out waiting for server '{0}'")]
    Timeout(String),

    #[error("server '{0}' is unavailable")]
    Unavailable(String),

    #[error("failed to start server '{0}': {1}")]
    Startup(String, String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether the router should retry the attempt that produced this error.
    ///
    /// Only timeouts are retryable; every other variant reflects either a
    /// caller mistake (validation/routing) or a server-side condition that a
    /// retry will not fix within the same attempt window.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}
