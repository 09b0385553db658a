//! Camera device infrastructure.
//!
//! A [`CameraBackend`] knows how to open one physical device once.  The
//! [`retrying_opener::RetryingDeviceOpener`] wraps any backend and turns it
//! into the application layer's
//! [`DeviceOpener`](crate::application::device::DeviceOpener) by retrying
//! transient failures.
//!
//! # Testability
//!
//! [`simulated::SimulatedCameraBackend`] implements the backend entirely in
//! memory, with configurable latency and injectable failures, so the arbiter
//! can be exercised without any camera hardware.

use async_trait::async_trait;
use camera_core::CameraId;
use thiserror::Error;

use crate::application::device::DeviceSession;

pub mod retrying_opener;
pub mod simulated;

/// Error type for a single device-open attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("camera {0} does not exist")]
    NotFound(CameraId),
    #[error("camera {0} is in use by another process")]
    Busy(CameraId),
    #[error("camera {camera_id} disconnected while opening: {reason}")]
    Disconnected { camera_id: CameraId, reason: String },
}

impl DeviceError {
    /// Returns `true` if another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeviceError::Busy(_) | DeviceError::Disconnected { .. })
    }
}

/// Opens physical camera devices, one attempt at a time.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Attempts to open `camera_id` once.
    async fn open(&self, camera_id: &CameraId) -> Result<DeviceSession, DeviceError>;
}
