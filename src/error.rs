//! Error types for the relay.

use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server already running on {0}")]
    AlreadyRunning(SocketAddr),

    #[error("motion source already running")]
    SourceAlreadyRunning,

    #[error("sample field `{0}` is not finite")]
    NonFiniteField(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid port {0}: expected a value within 1024-65535")]
    InvalidPort(u16),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
