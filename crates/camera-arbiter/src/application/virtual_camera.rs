//! VirtualCamera: the client-owned logical handle returned by `open`.
//!
//! A handle starts `Unopened` and is resolved by the request loop: it either
//! gets attached to an active device session (`Connected`) or is given up on
//! (`Disconnected`, with an [`OpenFailure`] explaining why).  While connected
//! it follows the device's state stream, so a device that starts closing
//! moves the handle to `Disconnected` and a device that finishes closing
//! moves it to `Closed`.
//!
//! # Ownership
//!
//! The client owns the handle.  The arbiter keeps clones only so it can
//! *transition* the state; it never decides when the handle goes away.
//! Clones share the same underlying state.
//!
//! # Forward-only state
//!
//! Every transition goes through [`HandleState::can_transition_to`], so a
//! handle that reached `Disconnected` or `Closed` can never come back.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use camera_core::{CameraId, DeviceState, HandleState, OpenFailure};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use super::idle_timer::IdleToken;
use crate::lock;

/// Live attachment of a handle to a session's device stream.
struct Binding {
    observer: JoinHandle<()>,
    _token: Option<IdleToken>,
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.observer.abort();
    }
}

struct Inner {
    id: Uuid,
    camera_id: CameraId,
    state: watch::Sender<HandleState>,
    failure: Mutex<Option<OpenFailure>>,
    binding: Mutex<Option<Binding>>,
}

/// Client-side logical camera handle with an observable connection state.
#[derive(Clone)]
pub struct VirtualCamera {
    inner: Arc<Inner>,
}

impl VirtualCamera {
    pub(crate) fn new(camera_id: CameraId) -> Self {
        let (state, _) = watch::channel(HandleState::Unopened);
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                camera_id,
                state,
                failure: Mutex::new(None),
                binding: Mutex::new(None),
            }),
        }
    }

    /// Unique id of this handle.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The camera this handle asked for.
    pub fn camera_id(&self) -> &CameraId {
        &self.inner.camera_id
    }

    /// Current connection state.
    pub fn state(&self) -> HandleState {
        *self.inner.state.borrow()
    }

    /// Why the handle was resolved without connecting, if it was.
    pub fn failure(&self) -> Option<OpenFailure> {
        *lock(&self.inner.failure)
    }

    /// Subscribes to connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<HandleState> {
        self.inner.state.subscribe()
    }

    /// Waits until the state satisfies `predicate` and returns that state.
    pub async fn wait_for(&self, mut predicate: impl FnMut(HandleState) -> bool) -> HandleState {
        let mut rx = self.subscribe();
        // `self` keeps the sender alive, so the channel cannot close here.
        let state = match rx.wait_for(|state| predicate(*state)).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        state
    }

    /// Waits until the request loop has resolved the handle one way or the
    /// other.
    pub async fn wait_until_resolved(&self) -> HandleState {
        self.wait_for(|state| state != HandleState::Unopened).await
    }

    /// Detaches the handle from its session, or cancels it if it is still
    /// queued.  Releasing the handle's idle token lets an otherwise unused
    /// session start its idle countdown.
    pub fn disconnect(&self) {
        if self.transition(HandleState::Disconnected) {
            debug!("handle {} for camera {} disconnected", self.id(), self.camera_id());
        }
        self.unbind();
    }

    /// Resolves a still-queued handle as failed.  No-op for any other state.
    pub(crate) fn fail(&self, reason: OpenFailure) {
        let mut failure = lock(&self.inner.failure);
        let failed = self.inner.state.send_if_modified(|state| {
            if *state == HandleState::Unopened {
                *state = HandleState::Disconnected;
                true
            } else {
                false
            }
        });
        if failed {
            *failure = Some(reason);
            debug!("handle {} for camera {} failed: {reason}", self.id(), self.camera_id());
        }
    }

    /// Attaches the handle to a device stream.
    ///
    /// Returns `false` (dropping `token`) if the handle is no longer
    /// `Unopened`.
    pub(crate) fn connect(
        &self,
        device_state: watch::Receiver<DeviceState>,
        token: Option<IdleToken>,
    ) -> bool {
        let mut binding = lock(&self.inner.binding);
        if !self.transition(HandleState::Connected) {
            return false;
        }
        let observer = tokio::spawn(follow_device(Arc::downgrade(&self.inner), device_state));
        *binding = Some(Binding {
            observer,
            _token: token,
        });
        true
    }

    fn transition(&self, next: HandleState) -> bool {
        self.inner.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    fn unbind(&self) {
        let binding = lock(&self.inner.binding).take();
        drop(binding);
    }

    fn is_bound(&self) -> bool {
        lock(&self.inner.binding).is_some()
    }
}

impl fmt::Debug for VirtualCamera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualCamera")
            .field("id", &self.id())
            .field("camera_id", self.camera_id())
            .field("state", &self.state())
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Mirrors a device's teardown onto a connected handle.
async fn follow_device(handle: Weak<Inner>, mut device_state: watch::Receiver<DeviceState>) {
    loop {
        let next = match *device_state.borrow_and_update() {
            DeviceState::Closing => Some(HandleState::Disconnected),
            DeviceState::Closed => Some(HandleState::Closed),
            _ => None,
        };
        if let Some(next) = next {
            let Some(inner) = handle.upgrade() else { return };
            let camera = VirtualCamera { inner };
            camera.transition(next);
            if next == HandleState::Closed {
                camera.unbind();
                return;
            }
        }
        if device_state.changed().await.is_err() {
            // The device dropped its publisher; nothing more will arrive.
            if let Some(inner) = handle.upgrade() {
                let camera = VirtualCamera { inner };
                camera.transition(HandleState::Closed);
                camera.unbind();
            }
            return;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
