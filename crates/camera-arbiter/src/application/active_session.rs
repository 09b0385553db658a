//! ActiveSession: one opened physical device and the handle it serves.
//!
//! A session is created by the request loop after a successful device open
//! and lives in the loop's active set until it is closed.  It owns:
//!
//! - the opened [`DeviceSession`],
//! - at most one bound [`VirtualCamera`] (binding a new one disconnects the
//!   previous one),
//! - an [`IdleTimer`] that asks the loop to close the session once nothing
//!   has been bound to it for [`IDLE_RELEASE_TIMEOUT`],
//! - a listener task that watches the device state stream.
//!
//! # Self-close without self-reference
//!
//! The idle timer's callback enqueues `Close(session)` into the same queue
//! the loop drains.  It only holds a `Weak<ActiveSession>` and a
//! [`WeakRequestQueue`], so a closed and forgotten session is freed even if
//! its timer is still counting.
//!
//! # Devices that close on their own
//!
//! If the device reaches `Closing`/`Closed` without [`ActiveSession::close`]
//! having been called (unplugged, evicted by the driver), the listener expires
//! the idle timer immediately so the loop prunes the dead session.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use camera_core::{CameraId, DeviceState};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::device::DeviceSession;
use super::idle_timer::{IdleTimer, IDLE_RELEASE_TIMEOUT};
use super::request_queue::{CameraRequest, QueueError, WeakRequestQueue};
use super::virtual_camera::VirtualCamera;
use crate::lock;

/// Live binding between one physical device and at most one handle.
pub struct ActiveSession {
    id: Uuid,
    camera_id: CameraId,
    device: DeviceSession,
    current: Mutex<Option<VirtualCamera>>,
    idle_timer: IdleTimer,
    closing: Arc<AtomicBool>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ActiveSession {
    /// Wraps a freshly opened device and starts its listener and idle
    /// countdown.
    pub(crate) fn start(device: DeviceSession, queue: WeakRequestQueue) -> Arc<Self> {
        Self::start_with_timeout(device, queue, IDLE_RELEASE_TIMEOUT)
    }

    fn start_with_timeout(
        device: DeviceSession,
        queue: WeakRequestQueue,
        idle_timeout: Duration,
    ) -> Arc<Self> {
        let camera_id = device.camera_id().clone();
        let session = Arc::new_cyclic(|this: &Weak<Self>| {
            let this = this.clone();
            Self {
                id: Uuid::new_v4(),
                camera_id,
                device,
                current: Mutex::new(None),
                idle_timer: IdleTimer::new(idle_timeout, move || request_close(&this, &queue)),
                closing: Arc::new(AtomicBool::new(false)),
                listener: Mutex::new(None),
            }
        });

        let listener = tokio::spawn(watch_device(
            session.device.state(),
            session.idle_timer.clone(),
            Arc::clone(&session.closing),
        ));
        *lock(&session.listener) = Some(listener);
        session.idle_timer.arm();
        session
    }

    /// Unique id of this session.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The camera this session holds open.
    pub fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }

    /// Latest state reported by the underlying device.
    pub fn device_state(&self) -> DeviceState {
        *self.device.state().borrow()
    }

    /// The handle currently bound to this session, if any.
    pub fn current_handle(&self) -> Option<VirtualCamera> {
        lock(&self.current).clone()
    }

    /// Binds `handle` to this session and disconnects the handle it replaces.
    ///
    /// A handle that was resolved in the meantime is left untouched and the
    /// current binding is kept.
    pub fn connect_to(&self, handle: VirtualCamera) {
        let token = self.idle_timer.acquire();
        if !handle.connect(self.device.state(), token) {
            debug!(
                "handle {} for camera {} resolved before attach; keeping current binding",
                handle.id(),
                self.camera_id
            );
            return;
        }
        debug!("handle {} attached to camera {}", handle.id(), self.camera_id);
        let previous = lock(&self.current).replace(handle);
        if let Some(previous) = previous {
            previous.disconnect();
        }
    }

    /// Closes the session: retires the idle timer, disconnects the bound
    /// handle, and closes the device.  Safe to call any number of times.
    pub async fn close(&self) {
        if !self.closing.swap(true, Ordering::AcqRel) {
            info!("closing camera {} (session {})", self.camera_id, self.id);
        }
        self.idle_timer.release();
        let current = lock(&self.current).take();
        if let Some(handle) = current {
            handle.disconnect();
        }
        self.device.close().await;
    }

    /// Suspends until the device confirms it is closed.
    pub async fn await_closed(&self) {
        self.device.await_closed().await;
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
    }
}

impl fmt::Debug for ActiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveSession")
            .field("id", &self.id)
            .field("camera_id", &self.camera_id)
            .field("device_state", &self.device_state())
            .field("current", &self.current_handle().map(|h| h.id()))
            .finish()
    }
}

/// Idle-timer callback: asks the request loop to close `session`.
///
/// Returns `false` only when the inbox is full, so the timer tries again.  A
/// session or loop that is already gone needs no close.
fn request_close(session: &Weak<ActiveSession>, queue: &WeakRequestQueue) -> bool {
    let (Some(session), Some(queue)) = (session.upgrade(), queue.upgrade()) else {
        return true;
    };
    let camera_id = session.camera_id.clone();
    match queue.try_enqueue(CameraRequest::Close(session)) {
        Ok(()) => {
            debug!("camera {camera_id} idle; close requested");
            true
        }
        Err(QueueError::Full) => {
            warn!("camera {camera_id} idle but the request queue is full; retrying later");
            false
        }
        Err(QueueError::Closed) => true,
    }
}

/// Watches the device until it starts closing, then retires the idle timer.
async fn watch_device(
    mut state: watch::Receiver<DeviceState>,
    idle_timer: IdleTimer,
    closing: Arc<AtomicBool>,
) {
    loop {
        if state.borrow_and_update().is_closing_or_closed() {
            break;
        }
        if state.changed().await.is_err() {
            break;
        }
    }
    if closing.load(Ordering::Acquire) {
        idle_timer.release();
    } else if idle_timer.expire() {
        debug!("device closed outside the arbiter; pruning its session");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
