//! Collaborator contracts the request loop depends on.
//!
//! The arbiter does not talk to camera drivers itself.  It consumes three
//! abstractions, injected at construction time so the loop is fully testable:
//!
//! - [`CameraDevice`] – one opened physical device: its state stream and a
//!   way to close it.
//! - [`DeviceOpener`] – opens a device, retrying internally.
//! - [`Permissions`] – answers whether the process may use cameras at all.
//!
//! Infrastructure implementations live in `crate::infrastructure`.

use std::sync::Arc;

use async_trait::async_trait;
use camera_core::{CameraId, DeviceState};
use tokio::sync::watch;

/// One opened physical camera device.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// The camera this device was opened for.
    fn camera_id(&self) -> &CameraId;

    /// Subscribes to the device's state.  Each call returns a fresh receiver
    /// that starts from the current state.
    fn state(&self) -> watch::Receiver<DeviceState>;

    /// Requests the device to close.  Must be idempotent: closing a device
    /// that is already closing or closed does nothing.
    async fn close(&self);

    /// Suspends until the device reports `Closed`, however many times
    /// `close` has been called.
    async fn await_closed(&self) {
        let mut state = self.state();
        // A publisher that went away cannot reopen the device, so an error
        // here means the device is gone, which counts as closed.
        let _ = state.wait_for(|s| *s == DeviceState::Closed).await;
    }
}

/// Shared handle to an opened device.
pub type DeviceSession = Arc<dyn CameraDevice>;

/// Opens physical devices with bounded retries.
#[async_trait]
pub trait DeviceOpener: Send + Sync {
    /// Returns the opened device, or `None` once retries are exhausted.
    async fn open_with_retry(&self, camera_id: &CameraId) -> Option<DeviceSession>;
}

/// Permission gate checked before every device open.
#[cfg_attr(test, mockall::automock)]
pub trait Permissions: Send + Sync {
    /// Returns `true` if the process may open cameras.
    fn has_camera_permission(&self) -> bool;
}
