//! RequestQueue: the bounded inbox feeding the arbiter's request loop.
//!
//! Producers (client calls and idle timers) push [`CameraRequest`]s; the
//! request loop is the only consumer.  The queue never applies backpressure:
//! the application is expected to rate-limit itself, so a full queue means a
//! caller is misbehaving and [`RequestQueue::enqueue`] treats it as fatal.
//!
//! # Strong and weak producers
//!
//! The [`CameraArbiter`](super::arbiter::CameraArbiter) facade owns the only
//! long-lived strong [`RequestQueue`].  Sessions and their idle timers hold a
//! [`WeakRequestQueue`], so once the facade is gone the channel closes and
//! the request loop can wind down instead of waiting forever.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use super::active_session::ActiveSession;
use super::virtual_camera::VirtualCamera;

/// Number of requests the inbox can buffer.
pub const REQUEST_QUEUE_DEPTH: usize = 8;

/// A request to bind a handle to the device for its camera id.
#[derive(Clone, Debug)]
pub struct OpenRequest {
    /// The client's handle; its camera id selects the device.
    pub handle: VirtualCamera,
    /// `false` closes every session for other camera ids first.
    pub share: bool,
}

/// Work item consumed by the request loop.
pub enum CameraRequest {
    /// Bind a handle to the device for its camera id.
    Open(OpenRequest),
    /// Close one specific session.
    Close(Arc<ActiveSession>),
    /// Close every session and discard every pending open queued before it.
    CloseAll,
}

impl fmt::Debug for CameraRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraRequest::Open(open) => f
                .debug_struct("Open")
                .field("camera_id", open.handle.camera_id())
                .field("handle", &open.handle.id())
                .field("share", &open.share)
                .finish(),
            CameraRequest::Close(session) => f
                .debug_struct("Close")
                .field("camera_id", session.camera_id())
                .field("session", &session.id())
                .finish(),
            CameraRequest::CloseAll => f.write_str("CloseAll"),
        }
    }
}

/// Error returned by [`RequestQueue::try_enqueue`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("more than {REQUEST_QUEUE_DEPTH} camera requests are buffered")]
    Full,
    #[error("camera request loop has stopped")]
    Closed,
}

/// Strong producer handle for the request inbox.
#[derive(Clone)]
pub struct RequestQueue {
    tx: mpsc::Sender<CameraRequest>,
}

/// Producer handle that does not keep the request loop alive.
#[derive(Clone)]
pub struct WeakRequestQueue {
    tx: mpsc::WeakSender<CameraRequest>,
}

/// Creates the request inbox and the receiver the request loop drains.
pub fn request_queue() -> (RequestQueue, mpsc::Receiver<CameraRequest>) {
    let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
    (RequestQueue { tx }, rx)
}

impl RequestQueue {
    /// Buffers `request` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Full`] when all slots are taken and
    /// [`QueueError::Closed`] when the request loop has stopped.
    pub fn try_enqueue(&self, request: CameraRequest) -> Result<(), QueueError> {
        self.tx.try_send(request).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Buffers `request`, which must always fit.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] when the request loop has stopped.
    ///
    /// # Panics
    ///
    /// Panics when the queue is full: producers are required to stay within
    /// [`REQUEST_QUEUE_DEPTH`] outstanding requests.
    pub fn enqueue(&self, request: CameraRequest) -> Result<(), QueueError> {
        match self.try_enqueue(request) {
            Err(QueueError::Full) => {
                panic!("there are more than {REQUEST_QUEUE_DEPTH} camera requests buffered")
            }
            Err(QueueError::Closed) => {
                warn!("camera request dropped: request loop has stopped");
                Err(QueueError::Closed)
            }
            Ok(()) => Ok(()),
        }
    }

    /// Returns a producer handle that does not keep the loop alive.
    pub fn downgrade(&self) -> WeakRequestQueue {
        WeakRequestQueue {
            tx: self.tx.downgrade(),
        }
    }
}

impl WeakRequestQueue {
    /// Returns a strong handle if the arbiter facade still exists.
    pub fn upgrade(&self) -> Option<RequestQueue> {
        self.tx.upgrade().map(|tx| RequestQueue { tx })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
