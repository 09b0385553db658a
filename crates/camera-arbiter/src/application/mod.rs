//! Application layer of the camera arbiter.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure types in `camera-core`) and the infrastructure (camera drivers,
//! configuration files).  Code here:
//!
//! - **Orchestrates** domain types to fulfil a client goal ("give me camera
//!   `1`, and close whatever else is open").
//! - **Depends on abstractions** ([`device::CameraDevice`],
//!   [`device::DeviceOpener`], [`device::Permissions`]) rather than concrete
//!   drivers, so tests can inject simulated devices.
//!
//! # Sub-modules
//!
//! - **`arbiter`**        – The single-consumer request loop and its client
//!   facade.  Every open, close, and close-all decision is made here.
//! - **`request_queue`**  – The bounded inbox and the request types.
//! - **`active_session`** – One opened device and the handle it serves.
//! - **`virtual_camera`** – The client-owned handle and its state machine.
//! - **`idle_timer`**     – Deferred release of sessions nobody uses.
//! - **`device`**         – Collaborator traits the loop consumes.

pub mod active_session;
pub mod arbiter;
pub mod device;
pub mod idle_timer;
pub mod request_queue;
pub mod virtual_camera;
