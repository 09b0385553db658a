//! Domain entities for the camera session arbiter.
//!
//! This module contains pure types with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! The innermost layer of a Clean Architecture codebase is the **domain**.
//! Domain code has no imports from OS APIs, async runtimes, or device
//! drivers, so it can be compiled and tested anywhere.  Outer layers (the
//! arbiter's application and infrastructure modules) depend on these types,
//! never the other way around.

/// Camera identifiers.
pub mod camera;

/// Device and handle lifecycle states.
pub mod state;
