//! Error types for the scan pipeline.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the camera session, frame converters and decoder.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The process may not use the camera. Not retried.
    #[error("camera permission denied")]
    PermissionDenied,

    /// The device could not be opened or is held by someone else.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// The device went away while in use.
    #[error("camera disconnected")]
    Disconnected,

    /// Stream or capture-session setup was rejected by the device.
    #[error("capture session configuration failed: {0}")]
    ConfigurationFailed(String),

    /// Another session held the camera lock for too long.
    #[error("timed out after {0:?} waiting for the camera lock")]
    LockTimeout(Duration),

    /// Shader, texture or readback buffer allocation failed.
    #[error("GPU resource failure: {0}")]
    GpuResource(String),

    /// The call is not valid in the current pipeline state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Copyable classification of a [`ScanError`], stored in session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PermissionDenied,
    DeviceUnavailable,
    Disconnected,
    ConfigurationFailed,
    LockTimeout,
    GpuResource,
    InvalidState,
    Other,
}

impl ScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::PermissionDenied => ErrorKind::PermissionDenied,
            ScanError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            ScanError::Disconnected => ErrorKind::Disconnected,
            ScanError::ConfigurationFailed(_) => ErrorKind::ConfigurationFailed,
            ScanError::LockTimeout(_) => ErrorKind::LockTimeout,
            ScanError::GpuResource(_) => ErrorKind::GpuResource,
            ScanError::InvalidState(_) => ErrorKind::InvalidState,
            ScanError::Image(_) | ScanError::Backend(_) => ErrorKind::Other,
        }
    }
}

pub type Result<T, E = ScanError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(ScanError::Disconnected.kind(), ErrorKind::Disconnected);
        assert_eq!(
            ScanError::LockTimeout(Duration::from_millis(2500)).kind(),
            ErrorKind::LockTimeout
        );
        let backend: ScanError = anyhow::anyhow!("driver exploded").into();
        assert_eq!(backend.kind(), ErrorKind::Other);
        assert_eq!(backend.to_string(), "driver exploded");
    }
}
