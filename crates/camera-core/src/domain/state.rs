//! Device and handle lifecycle states.
//!
//! # Two state machines (for beginners)
//!
//! A *physical device* and a *virtual handle* have separate lifecycles:
//!
//! ```text
//! DeviceState:  Unopened ──► Opening ──► Open ──► Closing ──► Closed
//!
//! HandleState:  Unopened ──► Connected ──► Disconnected ──► Closed
//!                   │                           ▲
//!                   └───────────────────────────┘ (open failed / discarded)
//! ```
//!
//! Both machines only move forward.  A handle that has been disconnected can
//! never be reconnected; the client asks the arbiter for a new handle instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state reported by a physical camera device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceState {
    /// No open has been requested yet.
    Unopened,
    /// The driver is opening the device.
    Opening,
    /// The device is open and usable.
    Open,
    /// A close was requested, or the device is being torn down.
    Closing,
    /// The device is closed and all of its resources are released.
    Closed,
}

impl DeviceState {
    fn rank(self) -> u8 {
        match self {
            DeviceState::Unopened => 0,
            DeviceState::Opening => 1,
            DeviceState::Open => 2,
            DeviceState::Closing => 3,
            DeviceState::Closed => 4,
        }
    }

    /// Returns `true` once teardown has started.  The arbiter only reacts to
    /// these two states.
    pub fn is_closing_or_closed(self) -> bool {
        matches!(self, DeviceState::Closing | DeviceState::Closed)
    }

    /// Returns `true` if `next` is a forward move in the device lifecycle.
    pub fn can_advance_to(self, next: DeviceState) -> bool {
        next.rank() > self.rank()
    }
}

/// Connection state of a virtual camera handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleState {
    /// The open request is queued and has not been resolved yet.
    Unopened,
    /// The handle is attached to an open device session.
    Connected,
    /// The handle was detached, replaced, discarded, or its device is closing.
    Disconnected,
    /// The device the handle was attached to has finished closing.
    Closed,
}

impl HandleState {
    fn rank(self) -> u8 {
        match self {
            HandleState::Unopened => 0,
            HandleState::Connected => 1,
            HandleState::Disconnected => 2,
            HandleState::Closed => 3,
        }
    }

    /// Returns `true` if moving to `next` respects the forward-only lifecycle.
    ///
    /// Self-transitions are rejected so that callers can detect no-ops.
    pub fn can_transition_to(self, next: HandleState) -> bool {
        next.rank() > self.rank()
    }

    /// Returns `true` for `Disconnected` and `Closed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, HandleState::Disconnected | HandleState::Closed)
    }
}

/// Reason a handle was resolved without ever connecting to a device.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenFailure {
    /// The process does not hold the camera permission.
    #[error("camera permission has not been granted")]
    PermissionDenied,
    /// The device opener exhausted its retries.
    #[error("camera device could not be opened")]
    OpenFailed,
    /// The request was discarded by a later close-all before it was served.
    #[error("open request was superseded by a close-all")]
    Superseded,
    /// The arbiter is no longer accepting requests.
    #[error("camera arbiter has stopped")]
    ArbiterStopped,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
