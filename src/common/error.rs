//! Error types for the object proxy
//!
//! Client-side failures fall into two families: local failures (the worker
//! could not be started, the channel broke, a line was unreadable) and remote
//! exceptions the worker reported through an `ng` response.

use std::io;
use thiserror::Error;

use crate::client::exception::RemoteError;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the client side of the proxy
#[derive(Error, Debug)]
pub enum Error {
    // === Worker Lifecycle Errors ===
    #[error("Worker program '{name}' not found. Searched: {searched}")]
    WorkerNotFound { name: String, searched: String },

    #[error("Worker failed to start after {attempts} attempt(s): {reason}")]
    WorkerStartFailed { attempts: u32, reason: String },

    #[error("Worker process exited before responding")]
    WorkerExited,

    #[error("No worker program configured. Set [worker] program in config.toml or pass --worker")]
    WorkerNotConfigured,

    // === Protocol Errors ===
    #[error("DecodeError: {0}")]
    Decode(String),

    #[error("ProtocolError: {0}")]
    Protocol(String),

    // === Remote Exceptions ===
    #[error(transparent)]
    Remote(#[from] RemoteError),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a worker not found error with search paths
    pub fn worker_not_found<S: AsRef<str>>(name: &str, paths: &[S]) -> Self {
        Self::WorkerNotFound {
            name: name.to_string(),
            searched: paths.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(", "),
        }
    }

    /// The reconstructed remote exception, if this error came from the worker
    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(e) => Some(e),
            _ => None,
        }
    }

    /// Kind string of the failure as it would appear on the wire
    pub fn kind(&self) -> &str {
        match self {
            Self::Remote(e) => e.kind(),
            Self::Decode(_) => crate::protocol::kind::DECODE_ERROR,
            Self::Protocol(_) => crate::protocol::kind::PROTOCOL_ERROR,
            _ => "ClientError",
        }
    }
}
