//! RetryingDeviceOpener: bounded retries around a [`CameraBackend`].
//!
//! Opening a camera commonly fails transiently: another process is releasing
//! it, or the driver is still settling after a previous close.  The opener
//! retries such failures a fixed number of times with a fixed pause between
//! attempts and gives up immediately on failures that cannot improve (an
//! unknown camera id).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use camera_core::CameraId;
use tokio::time;
use tracing::{error, info, warn};

use super::CameraBackend;
use crate::application::device::{DeviceOpener, DeviceSession};

/// How often and how patiently to retry a device open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.  Zero is treated as one.
    pub max_attempts: u32,
    /// Pause between consecutive attempts.
    pub retry_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_interval: Duration::from_millis(250),
        }
    }
}

/// [`DeviceOpener`] that retries transient backend failures.
pub struct RetryingDeviceOpener {
    backend: Arc<dyn CameraBackend>,
    policy: RetryPolicy,
}

impl RetryingDeviceOpener {
    pub fn new(backend: Arc<dyn CameraBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }
}

#[async_trait]
impl DeviceOpener for RetryingDeviceOpener {
    async fn open_with_retry(&self, camera_id: &CameraId) -> Option<DeviceSession> {
        let attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.backend.open(camera_id).await {
                Ok(device) => {
                    if attempt > 1 {
                        info!("camera {camera_id} opened on attempt {attempt}/{attempts}");
                    }
                    return Some(device);
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        "open attempt {attempt}/{attempts} for camera {camera_id} failed: {e}; retrying in {:?}",
                        self.policy.retry_interval
                    );
                    time::sleep(self.policy.retry_interval).await;
                }
                Err(e) => {
                    error!("giving up on camera {camera_id} after {attempt} attempt(s): {e}");
                    return None;
                }
            }
        }
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
