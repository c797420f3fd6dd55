// SPDX-License-Identifier: MPL-2.0

//! Error types for the scanner controller

use crate::backends::camera::BackendError;
use std::fmt;

/// Result type alias using ScannerError
pub type ScannerResult<T> = Result<T, ScannerError>;

/// Errors surfaced by [`ScannerController`](crate::ScannerController)
#[derive(Debug, Clone)]
pub enum ScannerError {
    /// No usable capture device on this hardware
    NoCameraAvailable,
    /// Camera access is denied, restricted or was never granted
    PermissionDenied,
    /// Swapping the session input to another device failed
    DeviceReconfigurationFailed(String),
    /// The active device has no controllable light source
    UnsupportedTorch,
    /// The rendering surface was dropped before scanning started
    SurfaceUnavailable,
    /// The capture session could not be built or driven
    Session(BackendError),
    /// Configuration errors
    Config(String),
}

impl ScannerError {
    /// Whether this error leaves the controller usable for a retry
    ///
    /// Every start failure leaves the controller Idle, so all variants are
    /// recoverable except a missing surface, which cannot come back.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ScannerError::SurfaceUnavailable)
    }
}

impl fmt::Display for ScannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScannerError::NoCameraAvailable => write!(f, "No camera available"),
            ScannerError::PermissionDenied => write!(f, "Camera permission denied"),
            ScannerError::DeviceReconfigurationFailed(msg) => {
                write!(f, "Device reconfiguration failed: {}", msg)
            }
            ScannerError::UnsupportedTorch => write!(f, "Active camera has no torch"),
            ScannerError::SurfaceUnavailable => write!(f, "Rendering surface is gone"),
            ScannerError::Session(e) => write!(f, "Capture session error: {}", e),
            ScannerError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ScannerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScannerError::Session(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BackendError> for ScannerError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::DeviceNotFound(_) => ScannerError::NoCameraAvailable,
            other => ScannerError::Session(other),
        }
    }
}

impl From<serde_json::Error> for ScannerError {
    fn from(err: serde_json::Error) -> Self {
        ScannerError::Config(err.to_string())
    }
}

impl From<std::io::Error> for ScannerError {
    fn from(err: std::io::Error) -> Self {
        ScannerError::Config(err.to_string())
    }
}
