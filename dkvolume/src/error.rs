//! Error types for dkvolume.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Listener and server errors.
///
/// Everything here is fatal to the server: these errors are returned from
/// provisioning or from the accept loop and are never retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error("address already in use: {address}")]
    AddressInUse { address: String },

    #[error("permission error on {}: {reason}", path.display())]
    Permission { path: PathBuf, reason: String },

    #[error("group not found: {group}")]
    GroupNotFound { group: String },

    #[error("unix socket creation is not supported on this platform")]
    UnsupportedPlatform,

    #[error("unsupported transport: {transport} (expected \"unix\" or \"tcp\")")]
    UnsupportedTransport { transport: String },

    #[error("invalid endpoint (expected unix://<path> or tcp://<host:port>): {endpoint}")]
    InvalidEndpoint { endpoint: String },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn permission(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Permission {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(io::Error),

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("invalid configuration: {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
}

/// A request body that could not be decoded into a
/// [`VolumeRequest`](crate::VolumeRequest).
///
/// Decode errors are per-request: the client gets a 400 and the driver is
/// never called.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DecodeError(#[from] pub serde_json::Error);
