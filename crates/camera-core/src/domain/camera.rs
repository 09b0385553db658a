//! Camera identifiers.
//!
//! A [`CameraId`] is the opaque, stable name a camera backend uses for one
//! physical device (for example `"0"` for the back camera of a phone, or
//! `"/dev/video2"` on Linux).  The arbiter never interprets the string; it
//! only compares ids for equality when deciding whether two requests target
//! the same device.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a string cannot be used as a camera id.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraIdError {
    #[error("camera id must not be empty")]
    Empty,
    #[error("camera id must not contain whitespace: {0:?}")]
    ContainsWhitespace(String),
}

/// Stable identifier of a physical camera device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CameraId(String);

impl CameraId {
    /// Creates a camera id after validating it.
    ///
    /// # Errors
    ///
    /// Returns [`CameraIdError::Empty`] for an empty string and
    /// [`CameraIdError::ContainsWhitespace`] if any whitespace is present.
    pub fn new(id: impl Into<String>) -> Result<Self, CameraIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CameraIdError::Empty);
        }
        if id.chars().any(char::is_whitespace) {
            return Err(CameraIdError::ContainsWhitespace(id));
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CameraId {
    type Err = CameraIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CameraId {
    type Error = CameraIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CameraId> for String {
    fn from(id: CameraId) -> Self {
        id.0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
