//! Infrastructure layer for the camera arbiter.
//!
//! Contains the adapters that satisfy the application layer's collaborator
//! traits: the retrying device opener, the simulated camera backend,
//! permission gates, and file-system configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `camera_core`, but MUST NOT be imported by the `application` layer outside
//! of tests.

pub mod device;
pub mod permissions;
pub mod storage;
