//! In-memory camera backend for tests and the demo binary.
//!
//! The simulated backend behaves like a small set of physical cameras:
//!
//! - opening takes `open_latency` and moves the device `Opening → Open`,
//! - closing takes `close_latency` and moves it `Closing → Closed`,
//! - [`SimulatedCameraBackend::fail_next_opens`] makes the next N opens of a
//!   camera fail with [`DeviceError::Busy`],
//! - [`SimulatedCameraBackend::disconnect`] yanks a device away, the way an
//!   unplugged USB camera would.
//!
//! Every successful open and every completed release is appended to an event
//! log, so tests can assert the exact order in which physical devices were
//! acquired and released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use camera_core::{CameraId, DeviceState};
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info};

use super::{CameraBackend, DeviceError};
use crate::application::device::{CameraDevice, DeviceSession};
use crate::lock;

/// One entry in the backend's device log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Opened(CameraId),
    Closed(CameraId),
}

#[derive(Default)]
struct CameraEntry {
    pending_failures: u32,
    releases: u32,
    open_now: u32,
    peak_open: u32,
    devices: Vec<Weak<DeviceInner>>,
}

struct Registry {
    cameras: HashMap<CameraId, CameraEntry>,
    attempts: HashMap<CameraId, u32>,
    events: Vec<DeviceEvent>,
    open_latency: Duration,
    close_latency: Duration,
}

impl Registry {
    fn record_open(&mut self, camera_id: &CameraId) {
        if let Some(entry) = self.cameras.get_mut(camera_id) {
            entry.open_now += 1;
            entry.peak_open = entry.peak_open.max(entry.open_now);
        }
        self.events.push(DeviceEvent::Opened(camera_id.clone()));
    }

    fn record_release(&mut self, camera_id: &CameraId) {
        if let Some(entry) = self.cameras.get_mut(camera_id) {
            entry.open_now = entry.open_now.saturating_sub(1);
            entry.releases += 1;
        }
        self.events.push(DeviceEvent::Closed(camera_id.clone()));
    }
}

/// Simulated set of cameras.  Clones share the same registry.
#[derive(Clone)]
pub struct SimulatedCameraBackend {
    registry: Arc<Mutex<Registry>>,
}

impl SimulatedCameraBackend {
    /// Creates a backend exposing the given camera ids, with instant opens
    /// and closes.
    ///
    /// Ids that are not valid [`CameraId`]s are skipped.
    pub fn new<'a>(cameras: impl IntoIterator<Item = &'a str>) -> Self {
        let cameras = cameras
            .into_iter()
            .filter_map(|id| CameraId::new(id).ok())
            .map(|id| (id, CameraEntry::default()))
            .collect();
        Self {
            registry: Arc::new(Mutex::new(Registry {
                cameras,
                attempts: HashMap::new(),
                events: Vec::new(),
                open_latency: Duration::ZERO,
                close_latency: Duration::ZERO,
            })),
        }
    }

    /// Sets how long opening and closing a device take.
    pub fn with_latency(self, open_latency: Duration, close_latency: Duration) -> Self {
        {
            let mut registry = lock(&self.registry);
            registry.open_latency = open_latency;
            registry.close_latency = close_latency;
        }
        self
    }

    /// Makes a camera available.  Adding an existing camera does nothing.
    pub fn add_camera(&self, camera_id: CameraId) {
        lock(&self.registry).cameras.entry(camera_id).or_default();
    }

    /// Makes the next `count` opens of `camera_id` fail as busy.
    pub fn fail_next_opens(&self, camera_id: &CameraId, count: u32) {
        if let Some(entry) = lock(&self.registry).cameras.get_mut(camera_id) {
            entry.pending_failures = count;
        }
    }

    /// Number of open attempts made for `camera_id`, failed ones included.
    pub fn open_attempts(&self, camera_id: &CameraId) -> u32 {
        lock(&self.registry).attempts.get(camera_id).copied().unwrap_or(0)
    }

    /// Number of times a device for `camera_id` finished releasing.
    pub fn release_count(&self, camera_id: &CameraId) -> u32 {
        lock(&self.registry)
            .cameras
            .get(camera_id)
            .map_or(0, |entry| entry.releases)
    }

    /// Highest number of simultaneously open devices seen for `camera_id`.
    pub fn peak_open(&self, camera_id: &CameraId) -> u32 {
        lock(&self.registry)
            .cameras
            .get(camera_id)
            .map_or(0, |entry| entry.peak_open)
    }

    /// Snapshot of the device log, oldest first.
    pub fn events(&self) -> Vec<DeviceEvent> {
        lock(&self.registry).events.clone()
    }

    /// Abruptly closes every live device of `camera_id`.
    ///
    /// Returns `true` if at least one device was disconnected.
    pub fn disconnect(&self, camera_id: &CameraId) -> bool {
        let devices: Vec<Arc<DeviceInner>> = {
            let mut registry = lock(&self.registry);
            let Some(entry) = registry.cameras.get_mut(camera_id) else {
                return false;
            };
            entry.devices.retain(|device| device.strong_count() > 0);
            entry.devices.iter().filter_map(Weak::upgrade).collect()
        };

        let mut any = false;
        for device in devices {
            let mut previous = DeviceState::Closed;
            let changed = device.state.send_if_modified(|state| {
                previous = *state;
                if state.can_advance_to(DeviceState::Closing) {
                    *state = DeviceState::Closed;
                    true
                } else {
                    false
                }
            });
            if changed {
                any = true;
                info!("camera {camera_id} disconnected");
                if previous == DeviceState::Open {
                    lock(&self.registry).record_release(camera_id);
                }
            }
        }
        any
    }
}

#[async_trait]
impl CameraBackend for SimulatedCameraBackend {
    async fn open(&self, camera_id: &CameraId) -> Result<DeviceSession, DeviceError> {
        let (device, open_latency) = {
            let mut registry = lock(&self.registry);
            *registry.attempts.entry(camera_id.clone()).or_insert(0) += 1;
            let close_latency = registry.close_latency;
            let open_latency = registry.open_latency;
            let Some(entry) = registry.cameras.get_mut(camera_id) else {
                return Err(DeviceError::NotFound(camera_id.clone()));
            };
            if entry.pending_failures > 0 {
                entry.pending_failures -= 1;
                return Err(DeviceError::Busy(camera_id.clone()));
            }
            let (state, _) = watch::channel(DeviceState::Opening);
            let device = Arc::new(DeviceInner {
                camera_id: camera_id.clone(),
                state,
                close_latency,
                registry: Arc::clone(&self.registry),
            });
            entry.devices.retain(|device| device.strong_count() > 0);
            entry.devices.push(Arc::downgrade(&device));
            (device, open_latency)
        };

        if !open_latency.is_zero() {
            time::sleep(open_latency).await;
        }

        let opened = device.state.send_if_modified(|state| {
            if state.can_advance_to(DeviceState::Open) {
                *state = DeviceState::Open;
                true
            } else {
                false
            }
        });
        if !opened {
            return Err(DeviceError::Disconnected {
                camera_id: camera_id.clone(),
                reason: "device went away while opening".to_string(),
            });
        }
        lock(&self.registry).record_open(camera_id);
        debug!("simulated camera {camera_id} open");
        Ok(Arc::new(SimulatedDevice { inner: device }))
    }
}

struct DeviceInner {
    camera_id: CameraId,
    state: watch::Sender<DeviceState>,
    close_latency: Duration,
    registry: Arc<Mutex<Registry>>,
}

impl DeviceInner {
    async fn finish_close(self: Arc<Self>) {
        if !self.close_latency.is_zero() {
            time::sleep(self.close_latency).await;
        }
        let closed = self.state.send_if_modified(|state| {
            if state.can_advance_to(DeviceState::Closed) {
                *state = DeviceState::Closed;
                true
            } else {
                false
            }
        });
        if closed {
            lock(&self.registry).record_release(&self.camera_id);
            debug!("simulated camera {} released", self.camera_id);
        }
    }
}

/// A device opened by [`SimulatedCameraBackend`].
pub struct SimulatedDevice {
    inner: Arc<DeviceInner>,
}

#[async_trait]
impl CameraDevice for SimulatedDevice {
    fn camera_id(&self) -> &CameraId {
        &self.inner.camera_id
    }

    fn state(&self) -> watch::Receiver<DeviceState> {
        self.inner.state.subscribe()
    }

    async fn close(&self) {
        let started = self.inner.state.send_if_modified(|state| {
            if state.can_advance_to(DeviceState::Closing) {
                *state = DeviceState::Closing;
                true
            } else {
                false
            }
        });
        if !started {
            return;
        }
        // The release completes even if the caller stops waiting for it.
        let release = tokio::spawn(Arc::clone(&self.inner).finish_close());
        let _ = release.await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
