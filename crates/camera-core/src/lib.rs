//! # camera-core
//!
//! Shared domain types for the camera session arbiter.
//!
//! This crate has zero dependencies on async runtimes, OS camera APIs, or
//! threads.  It only describes *what* the arbiter reasons about:
//!
//! - **`CameraId`** – the stable identifier of a physical camera device.
//! - **`DeviceState`** – the lifecycle a physical device reports while it is
//!   opened and closed (`Unopened → Opening → Open → Closing → Closed`).
//! - **`HandleState`** – the connection state of a client's virtual camera
//!   handle (`Unopened → Connected → Disconnected → Closed`).
//! - **`OpenFailure`** – why a handle was resolved without ever connecting.
//!
//! # Architecture overview (for beginners)
//!
//! Several clients may want the same camera, or different cameras, at the
//! same time.  Physical devices are expensive to open and usually cannot be
//! open concurrently, so a single *arbiter* decides which device is open and
//! which client handle is attached to it.  The arbiter itself lives in the
//! `camera-arbiter` crate; this crate holds the vocabulary both sides share.

pub mod domain;

// Re-export the most-used types at the crate root so callers can write
// `camera_core::CameraId` instead of `camera_core::domain::camera::CameraId`.
pub use domain::camera::{CameraId, CameraIdError};
pub use domain::state::{DeviceState, HandleState, OpenFailure};
