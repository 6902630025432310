//! Platform Error Types

use thiserror::Error;

/// Errors from platform capability operations
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Privilege broker is not connected")]
    BrokerUnavailable,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Unknown call code: {0}")]
    UnknownCall(u32),

    #[error("Player handle is no longer valid: {0}")]
    PlayerGone(String),

    #[error("Store I/O error: {0}")]
    StoreIo(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for PlatformError {
    fn from(err: serde_json::Error) -> Self {
        PlatformError::SerializationError(err.to_string())
    }
}
