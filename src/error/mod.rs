// Error types for the wagate portal core
// Author: kelexine (https://github.com/kelexine)

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),

    #[error("No authentication token available")]
    MissingCredential,

    #[error("Cannot resolve realtime endpoint: {0}")]
    Endpoint(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Realtime channel is not connected")]
    NotConnected,

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PortalError {
    /// Whether the realtime channel should retry after this error.
    ///
    /// Only transport failures are transient; configuration problems
    /// (missing token, unresolvable endpoint) are fatal for the attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, PortalError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, PortalError>;
