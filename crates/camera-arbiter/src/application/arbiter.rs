//! CameraArbiter: serializes open, share, and close requests for cameras.
//!
//! This use case is the heart of the crate.  Clients call
//! [`CameraArbiter::open`] and [`CameraArbiter::close_all`]; both only
//! enqueue a [`CameraRequest`] and return immediately.  A single consumer
//! task, the [`RequestLoop`], owns the set of active device sessions and is
//! the only code that mutates it, so no lock guards the active set.
//!
//! # One loop iteration
//!
//! ```text
//! drain inbox ─► Close? ──yes──► close that session, wait, restart
//!                  │no
//!                  ▼
//!              CloseAll? ─yes──► discard opens up to it, close everything, wait, restart
//!                  │no
//!                  ▼
//!              head Open stale? ─yes──► drop it, restart
//!                  │no
//!                  ▼
//!              exclusive and other cameras open? ─yes──► close them, wait, restart
//!                  │no
//!                  ▼
//!              session for this camera? ─no──► open device, add session, restart
//!                  │yes
//!                  ▼
//!              its device already closed? ─yes──► drop and close it, restart
//!                  │no
//!                  ▼
//!              attach handle, pop request
//! ```
//!
//! Every branch that waits restarts from the top, because new requests may
//! have arrived meanwhile.  Device teardown always completes before a
//! conflicting device is opened.

use std::collections::VecDeque;
use std::sync::Arc;

use camera_core::{CameraId, HandleState, OpenFailure};
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::active_session::ActiveSession;
use super::device::{DeviceOpener, Permissions};
use super::request_queue::{
    request_queue, CameraRequest, OpenRequest, RequestQueue, WeakRequestQueue,
};
use super::virtual_camera::VirtualCamera;

/// Client-facing entry point to the camera arbiter.
///
/// Dropping the arbiter (or calling [`shutdown`](Self::shutdown)) closes the
/// inbox; the request loop then closes every active session and exits.
pub struct CameraArbiter {
    queue: RequestQueue,
    task: JoinHandle<()>,
}

impl CameraArbiter {
    /// Spawns the request loop on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(permissions: Arc<dyn Permissions>, opener: Arc<dyn DeviceOpener>) -> Self {
        let (queue, requests) = request_queue();
        let request_loop = RequestLoop::new(requests, queue.downgrade(), permissions, opener);
        let task = tokio::spawn(request_loop.run());
        Self { queue, task }
    }

    /// Requests `camera_id` and returns a handle in the `Unopened` state.
    ///
    /// With `share == false` every other open camera is closed first.
    ///
    /// # Panics
    ///
    /// Panics if more than [`REQUEST_QUEUE_DEPTH`](super::request_queue::REQUEST_QUEUE_DEPTH)
    /// requests are outstanding.
    pub fn open(&self, camera_id: CameraId, share: bool) -> VirtualCamera {
        let handle = VirtualCamera::new(camera_id);
        let request = CameraRequest::Open(OpenRequest {
            handle: handle.clone(),
            share,
        });
        if self.queue.enqueue(request).is_err() {
            handle.fail(OpenFailure::ArbiterStopped);
        }
        handle
    }

    /// Requests that every session be closed and every queued open be
    /// discarded.
    ///
    /// # Panics
    ///
    /// Panics if more than [`REQUEST_QUEUE_DEPTH`](super::request_queue::REQUEST_QUEUE_DEPTH)
    /// requests are outstanding.
    pub fn close_all(&self) {
        // A stopped loop has already closed everything.
        let _ = self.queue.enqueue(CameraRequest::CloseAll);
    }

    /// Closes every session, stops the request loop, and waits for it.
    ///
    /// With a full inbox the queued requests still run; the loop closes
    /// whatever is left open once it drains the closed inbox.
    pub async fn shutdown(self) {
        let Self { queue, task } = self;
        let _ = queue.try_enqueue(CameraRequest::CloseAll);
        drop(queue);
        if let Err(e) = task.await {
            error!("camera request loop ended abnormally: {e}");
        }
    }
}

/// Single consumer of the request inbox.
pub(crate) struct RequestLoop {
    requests: mpsc::Receiver<CameraRequest>,
    queue: WeakRequestQueue,
    pending: VecDeque<CameraRequest>,
    active: Vec<Arc<ActiveSession>>,
    permissions: Arc<dyn Permissions>,
    opener: Arc<dyn DeviceOpener>,
}

impl RequestLoop {
    pub(crate) fn new(
        requests: mpsc::Receiver<CameraRequest>,
        queue: WeakRequestQueue,
        permissions: Arc<dyn Permissions>,
        opener: Arc<dyn DeviceOpener>,
    ) -> Self {
        Self {
            requests,
            queue,
            pending: VecDeque::new(),
            active: Vec::new(),
            permissions,
            opener,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("camera request loop started");
        while self.read_requests().await {
            self.step().await;
        }
        let remaining = std::mem::take(&mut self.active);
        if !remaining.is_empty() {
            info!("closing {} camera(s) before stopping", remaining.len());
            close_sessions(remaining).await;
        }
        info!("camera request loop stopped");
    }

    /// Waits for at least one request, then drains whatever else is buffered.
    ///
    /// Returns `false` once the inbox is closed and nothing is left to do.
    async fn read_requests(&mut self) -> bool {
        if self.pending.is_empty() {
            match self.requests.recv().await {
                Some(request) => self.pending.push_back(request),
                None => return false,
            }
        }
        while let Ok(request) = self.requests.try_recv() {
            self.pending.push_back(request);
        }
        debug!("{} camera request(s) pending", self.pending.len());
        true
    }

    /// Runs one iteration of the arbitration rules against `pending`.
    async fn step(&mut self) {
        // Closes of specific sessions always go first.
        if let Some(index) = self
            .pending
            .iter()
            .position(|r| matches!(r, CameraRequest::Close(_)))
        {
            if let Some(CameraRequest::Close(session)) = self.pending.remove(index) {
                self.active.retain(|s| !Arc::ptr_eq(s, &session));
                close_sessions(vec![session]).await;
            }
            return;
        }

        // A close-all wins over everything queued before it.
        if let Some(last) = self
            .pending
            .iter()
            .rposition(|r| matches!(r, CameraRequest::CloseAll))
        {
            for request in self.pending.drain(..=last) {
                if let CameraRequest::Open(open) = request {
                    open.handle.fail(OpenFailure::Superseded);
                }
            }
            let sessions = std::mem::take(&mut self.active);
            info!("close-all: closing {} camera(s)", sessions.len());
            close_sessions(sessions).await;
            return;
        }

        let request = match self.pending.front() {
            Some(CameraRequest::Open(open)) => open.clone(),
            Some(_) => unreachable!("close requests are serviced before opens"),
            None => return,
        };

        if request.handle.state() != HandleState::Unopened {
            debug!(
                "dropping stale open for camera {} (handle {})",
                request.handle.camera_id(),
                request.handle.id()
            );
            self.pending.pop_front();
            return;
        }

        let camera_id = request.handle.camera_id().clone();
        if !request.share {
            let (conflicting, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active)
                .into_iter()
                .partition(|s| s.camera_id() != &camera_id);
            self.active = kept;
            if !conflicting.is_empty() {
                info!(
                    "closing {} camera(s) before opening camera {camera_id}",
                    conflicting.len()
                );
                close_sessions(conflicting).await;
                return;
            }
        }

        let existing = self
            .active
            .iter()
            .find(|s| s.camera_id() == &camera_id)
            .cloned();
        match existing {
            // The device went away but its close request never reached us.
            Some(session) if session.device_state().is_closing_or_closed() => {
                info!("camera {camera_id} closed outside the arbiter; replacing its session");
                self.active.retain(|s| !Arc::ptr_eq(s, &session));
                close_sessions(vec![session]).await;
            }
            Some(session) => {
                session.connect_to(request.handle);
                self.pending.pop_front();
            }
            None => match self.open_device(&camera_id).await {
                Ok(session) => self.active.push(session),
                Err(failure) => {
                    request.handle.fail(failure);
                    self.pending.pop_front();
                }
            },
        }
    }

    async fn open_device(&self, camera_id: &CameraId) -> Result<Arc<ActiveSession>, OpenFailure> {
        if !self.permissions.has_camera_permission() {
            warn!("cannot open camera {camera_id}: camera permission not granted");
            return Err(OpenFailure::PermissionDenied);
        }
        match self.opener.open_with_retry(camera_id).await {
            Some(device) => {
                info!("opened camera {camera_id}");
                Ok(ActiveSession::start(device, self.queue.clone()))
            }
            None => {
                warn!("failed to open camera {camera_id}");
                Err(OpenFailure::OpenFailed)
            }
        }
    }

    #[cfg(test)]
    fn active_camera_ids(&self) -> Vec<CameraId> {
        self.active.iter().map(|s| s.camera_id().clone()).collect()
    }
}

/// Closes `sessions` concurrently and waits until every device is closed.
async fn close_sessions(sessions: Vec<Arc<ActiveSession>>) {
    for session in &sessions {
        let session = Arc::clone(session);
        tokio::spawn(async move { session.close().await });
    }
    join_all(sessions.iter().map(|s| s.await_closed())).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
