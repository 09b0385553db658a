//! Integration tests for the camera arbiter.
//!
//! # Purpose
//!
//! These tests drive [`CameraArbiter`] through its *public* API only, the way
//! an application embedding the crate would, against the in-memory
//! [`SimulatedCameraBackend`].  They verify:
//!
//! - exclusive opens close other cameras before the new device is opened,
//! - repeated and shared opens reuse the existing session,
//! - close-all discards queued opens and closes every session,
//! - an unbound session is released after the idle window,
//! - permission denial, opener exhaustion, external disconnects, and shutdown.
//!
//! # Time
//!
//! Every test runs with Tokio's clock paused (`start_paused = true`).  Sleeps
//! complete instantly once all tasks are idle, so the 1000 ms idle window and
//! the simulated device latencies elapse deterministically.

use std::sync::Arc;
use std::time::Duration;

use camera_arbiter::application::idle_timer::IDLE_RELEASE_TIMEOUT;
use camera_arbiter::infrastructure::device::retrying_opener::{RetryPolicy, RetryingDeviceOpener};
use camera_arbiter::infrastructure::device::simulated::{DeviceEvent, SimulatedCameraBackend};
use camera_arbiter::infrastructure::permissions::StaticPermissions;
use camera_arbiter::{CameraArbiter, VirtualCamera};
use camera_core::{CameraId, HandleState, OpenFailure};

fn camera(id: &str) -> CameraId {
    CameraId::new(id).unwrap()
}

fn start(backend: &SimulatedCameraBackend, permissions: Arc<StaticPermissions>) -> CameraArbiter {
    let opener = RetryingDeviceOpener::new(
        Arc::new(backend.clone()),
        RetryPolicy {
            max_attempts: 3,
            retry_interval: Duration::from_millis(20),
        },
    );
    CameraArbiter::start(permissions, Arc::new(opener))
}

fn start_granted(backend: &SimulatedCameraBackend) -> CameraArbiter {
    start(backend, Arc::new(StaticPermissions::granted()))
}

async fn connected(handle: &VirtualCamera) {
    let state = handle.wait_until_resolved().await;
    assert_eq!(state, HandleState::Connected, "handle {:?} failed: {:?}", handle, handle.failure());
}

/// Lets every runnable task make progress and `ms` of paused time elapse.
async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    tokio::task::yield_now().await;
}

// ── Exclusive and shared opens ────────────────────────────────────────────────

/// Exclusive open of B while A is active: A's device is fully released before
/// B's device is opened.
#[tokio::test(start_paused = true)]
async fn test_exclusive_open_closes_other_camera_first() {
    // Arrange
    let backend = SimulatedCameraBackend::new(["A", "B"])
        .with_latency(Duration::from_millis(50), Duration::from_millis(100));
    let arbiter = start_granted(&backend);

    // Act
    let a = arbiter.open(camera("A"), false);
    let b = arbiter.open(camera("B"), false);
    connected(&b).await;

    // Assert
    assert_eq!(a.state(), HandleState::Disconnected);
    assert_eq!(b.state(), HandleState::Connected);
    assert_eq!(
        backend.events(),
        vec![
            DeviceEvent::Opened(camera("A")),
            DeviceEvent::Closed(camera("A")),
            DeviceEvent::Opened(camera("B")),
        ]
    );
}

/// Opening the same camera twice reuses the session and moves the binding.
#[tokio::test(start_paused = true)]
async fn test_second_open_of_same_camera_reuses_device() {
    // Arrange
    let backend = SimulatedCameraBackend::new(["A"]);
    let arbiter = start_granted(&backend);
    let first = arbiter.open(camera("A"), false);
    connected(&first).await;

    // Act
    let second = arbiter.open(camera("A"), false);
    connected(&second).await;

    // Assert
    assert_eq!(first.state(), HandleState::Disconnected);
    assert_eq!(second.state(), HandleState::Connected);
    assert_eq!(backend.open_attempts(&camera("A")), 1);
    assert_eq!(backend.release_count(&camera("A")), 0);
}

/// Two shared opens of one camera attach to the single session.
#[tokio::test(start_paused = true)]
async fn test_shared_opens_of_same_camera_attach_to_one_session() {
    let backend = SimulatedCameraBackend::new(["A"]);
    let arbiter = start_granted(&backend);

    let first = arbiter.open(camera("A"), true);
    let second = arbiter.open(camera("A"), true);
    connected(&second).await;

    assert_eq!(first.state(), HandleState::Disconnected, "a session serves one handle at a time");
    assert_eq!(backend.open_attempts(&camera("A")), 1);
    assert_eq!(backend.release_count(&camera("A")), 0);
    assert_eq!(backend.peak_open(&camera("A")), 1);
}

/// A shared open of another camera leaves the first one open.
#[tokio::test(start_paused = true)]
async fn test_shared_open_keeps_other_cameras_open() {
    let backend = SimulatedCameraBackend::new(["A", "B"]);
    let arbiter = start_granted(&backend);

    let a = arbiter.open(camera("A"), false);
    let b = arbiter.open(camera("B"), true);
    connected(&b).await;

    assert_eq!(a.state(), HandleState::Connected);
    assert_eq!(backend.release_count(&camera("A")), 0);
    assert_eq!(
        backend.events(),
        vec![DeviceEvent::Opened(camera("A")), DeviceEvent::Opened(camera("B"))]
    );
}

// ── Close-all ─────────────────────────────────────────────────────────────────

/// Close-all supersedes a queued open and closes the active session.
#[tokio::test(start_paused = true)]
async fn test_close_all_discards_pending_open_and_closes_active() {
    // Arrange
    let backend = SimulatedCameraBackend::new(["A", "B"]);
    let arbiter = start_granted(&backend);
    let b = arbiter.open(camera("B"), true);
    connected(&b).await;

    // Act
    let a = arbiter.open(camera("A"), true);
    arbiter.close_all();
    settle(10).await;

    // Assert
    assert_eq!(a.state(), HandleState::Disconnected);
    assert_eq!(a.failure(), Some(OpenFailure::Superseded));
    assert_eq!(backend.open_attempts(&camera("A")), 0);
    assert_eq!(b.state(), HandleState::Disconnected);
    assert_eq!(backend.release_count(&camera("B")), 1);
}

/// Opens queued after a close-all are still served.
#[tokio::test(start_paused = true)]
async fn test_open_after_close_all_is_served() {
    let backend = SimulatedCameraBackend::new(["A"]);
    let arbiter = start_granted(&backend);

    arbiter.close_all();
    let a = arbiter.open(camera("A"), false);
    connected(&a).await;

    assert_eq!(a.failure(), None);
}

// ── Idle release ──────────────────────────────────────────────────────────────

/// Unbinding the only handle lets the idle window elapse and releases the
/// device.
#[tokio::test(start_paused = true)]
async fn test_unbound_session_is_released_after_idle_window() {
    // Arrange
    let backend = SimulatedCameraBackend::new(["A"]);
    let arbiter = start_granted(&backend);
    let a = arbiter.open(camera("A"), false);
    connected(&a).await;

    // Act
    a.disconnect();
    settle(IDLE_RELEASE_TIMEOUT.as_millis() as u64 - 100).await;
    assert_eq!(backend.release_count(&camera("A")), 0, "window has not elapsed yet");
    settle(200).await;

    // Assert
    assert_eq!(backend.release_count(&camera("A")), 1);
    assert_eq!(backend.events().last(), Some(&DeviceEvent::Closed(camera("A"))));
}

/// Rebinding within the idle window keeps the device open.
#[tokio::test(start_paused = true)]
async fn test_rebind_within_idle_window_keeps_device_open() {
    let backend = SimulatedCameraBackend::new(["A"]);
    let arbiter = start_granted(&backend);
    let first = arbiter.open(camera("A"), false);
    connected(&first).await;

    first.disconnect();
    settle(500).await;
    let second = arbiter.open(camera("A"), false);
    connected(&second).await;
    settle(2_000).await;

    assert_eq!(second.state(), HandleState::Connected);
    assert_eq!(backend.release_count(&camera("A")), 0);
    assert_eq!(backend.open_attempts(&camera("A")), 1);
}

// ── Failures ──────────────────────────────────────────────────────────────────

/// Without permission the opener is never called; granting it later works.
#[tokio::test(start_paused = true)]
async fn test_permission_denied_then_granted() {
    // Arrange
    let backend = SimulatedCameraBackend::new(["A"]);
    let permissions = Arc::new(StaticPermissions::denied());
    let arbiter = start(&backend, Arc::clone(&permissions));

    // Act
    let denied = arbiter.open(camera("A"), false);
    let state = denied.wait_until_resolved().await;

    // Assert
    assert_eq!(state, HandleState::Disconnected);
    assert_eq!(denied.failure(), Some(OpenFailure::PermissionDenied));
    assert_eq!(backend.open_attempts(&camera("A")), 0);

    permissions.grant();
    let granted = arbiter.open(camera("A"), false);
    connected(&granted).await;
}

/// An opener that runs out of retries fails the handle and the arbiter
/// keeps serving.
#[tokio::test(start_paused = true)]
async fn test_open_exhaustion_fails_handle_and_arbiter_continues() {
    let backend = SimulatedCameraBackend::new(["A", "B"]);
    backend.fail_next_opens(&camera("A"), 10);
    let arbiter = start_granted(&backend);

    let a = arbiter.open(camera("A"), false);
    let b = arbiter.open(camera("B"), false);
    connected(&b).await;

    assert_eq!(a.state(), HandleState::Disconnected);
    assert_eq!(a.failure(), Some(OpenFailure::OpenFailed));
    assert_eq!(backend.open_attempts(&camera("A")), 3);
}

/// A camera that disappears is pruned and can be opened afresh.
#[tokio::test(start_paused = true)]
async fn test_externally_closed_device_is_pruned() {
    // Arrange
    let backend = SimulatedCameraBackend::new(["A"]);
    let arbiter = start_granted(&backend);
    let first = arbiter.open(camera("A"), false);
    connected(&first).await;

    // Act
    assert!(backend.disconnect(&camera("A")));
    let state = first.wait_for(|s| s == HandleState::Closed).await;
    settle(10).await;
    let second = arbiter.open(camera("A"), false);
    connected(&second).await;
    settle(10).await;

    // Assert
    assert_eq!(state, HandleState::Closed);
    assert_eq!(second.state(), HandleState::Connected);
    assert_eq!(backend.open_attempts(&camera("A")), 2);
}

/// A handle cancelled while its open is queued is never attached.
#[tokio::test(start_paused = true)]
async fn test_cancelled_open_is_dropped() {
    let backend = SimulatedCameraBackend::new(["A"]);
    let arbiter = start_granted(&backend);

    let cancelled = arbiter.open(camera("A"), false);
    cancelled.disconnect();
    settle(10).await;

    assert_eq!(cancelled.state(), HandleState::Disconnected);
    assert_eq!(cancelled.failure(), None);
    assert_eq!(backend.open_attempts(&camera("A")), 0);
}

// ── Queue and lifecycle ───────────────────────────────────────────────────────

/// Buffering more requests than the queue holds is a usage error.
#[tokio::test(start_paused = true)]
#[should_panic(expected = "more than 8 camera requests buffered")]
async fn test_queue_overflow_panics() {
    let backend = SimulatedCameraBackend::new(["A"]);
    let arbiter = start_granted(&backend);
    for _ in 0..9 {
        let _ = arbiter.open(camera("A"), true);
    }
}

/// Shutdown closes every active session before returning.
#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_all_sessions() {
    // Arrange
    let backend = SimulatedCameraBackend::new(["A", "B"])
        .with_latency(Duration::ZERO, Duration::from_millis(100));
    let arbiter = start_granted(&backend);
    let a = arbiter.open(camera("A"), true);
    let b = arbiter.open(camera("B"), true);
    connected(&b).await;

    // Act
    arbiter.shutdown().await;

    // Assert
    assert_eq!(a.state(), HandleState::Disconnected);
    assert_eq!(b.state(), HandleState::Disconnected);
    assert_eq!(backend.release_count(&camera("A")), 1);
    assert_eq!(backend.release_count(&camera("B")), 1);
}

/// No camera ever has two devices open at once, whatever the request mix.
#[tokio::test(start_paused = true)]
async fn test_at_most_one_device_per_camera() {
    let backend = SimulatedCameraBackend::new(["A", "B"]);
    let arbiter = start_granted(&backend);

    let mut last = None;
    for (id, share) in [("A", true), ("B", true), ("A", false), ("A", true), ("B", false)] {
        last = Some(arbiter.open(camera(id), share));
        settle(5).await;
    }
    if let Some(handle) = last {
        connected(&handle).await;
    }

    assert_eq!(backend.peak_open(&camera("A")), 1);
    assert_eq!(backend.peak_open(&camera("B")), 1);
}
