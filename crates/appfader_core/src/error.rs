//! Engine Error Types

use thiserror::Error;

/// Errors that can occur in the volume manager
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Platform error: {0}")]
    Platform(#[from] appfader_platform::PlatformError),

    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(String),

    #[error("Channel send error - manager worker gone")]
    ChannelSendError,
}

/// Result type alias for manager operations
pub type ManagerResult<T> = Result<T, ManagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ManagerError::ChannelSendError;
        assert!(err.to_string().contains("worker gone"));
    }

    #[test]
    fn test_error_from_platform() {
        let platform_err = appfader_platform::PlatformError::BrokerUnavailable;
        let err: ManagerError = platform_err.into();
        assert!(matches!(err, ManagerError::Platform(_)));
    }
}
