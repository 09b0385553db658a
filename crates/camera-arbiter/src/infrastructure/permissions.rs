//! Process-wide camera permission answered from a flag.
//!
//! Real platforms ask the OS (a privacy prompt, a udev group check).  The demo
//! binary and the integration tests only need a fixed answer, optionally
//! flipped at runtime to model the user granting access later.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::application::device::Permissions;

/// [`Permissions`] backed by a boolean flag.
#[derive(Debug)]
pub struct StaticPermissions {
    granted: AtomicBool,
}

impl StaticPermissions {
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
        }
    }

    /// Permission that is already granted.
    pub fn granted() -> Self {
        Self::new(true)
    }

    /// Permission that has not been granted.
    pub fn denied() -> Self {
        Self::new(false)
    }

    /// Grants camera access for all later opens.
    pub fn grant(&self) {
        if !self.granted.swap(true, Ordering::AcqRel) {
            info!("camera permission granted");
        }
    }

    /// Revokes camera access for all later opens.  Already open devices are
    /// not affected.
    pub fn revoke(&self) {
        if self.granted.swap(false, Ordering::AcqRel) {
            info!("camera permission revoked");
        }
    }
}

impl Permissions for StaticPermissions {
    fn has_camera_permission(&self) -> bool {
        self.granted.load(Ordering::Acquire)
    }
}
