//! camera-arbiter library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod application;
pub mod infrastructure;

pub use application::arbiter::CameraArbiter;
pub use application::virtual_camera::VirtualCamera;

/// Locks `mutex`, taking the guard back if a previous holder panicked.
///
/// Every critical section in this crate leaves its data consistent before it
/// can panic, so a poisoned lock still guards valid state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
