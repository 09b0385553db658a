//! TOML-based configuration for the camera arbiter binary.
//!
//! Reads and writes `ArbiterConfig` from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\CameraArbiter\config.toml`
//! - Linux:    `~/.config/camera-arbiter/config.toml`
//! - macOS:    `~/Library/Application Support/CameraArbiter/config.toml`
//!
//! Example:
//!
//! ```toml
//! [arbiter]
//! log_level = "debug"
//!
//! [opener]
//! max_attempts = 5
//! retry_interval_ms = 100
//!
//! [simulator]
//! cameras = ["front", "back"]
//! open_latency_ms = 50
//! close_latency_ms = 100
//! ```
//!
//! Every field has a serde default, so a missing file, an empty file, and a
//! file written by an older version all load.
//!
//! The idle-release window and the request queue depth are fixed properties
//! of the arbiter and intentionally have no config keys.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::device::retrying_opener::RetryPolicy;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArbiterConfig {
    #[serde(default)]
    pub arbiter: ArbiterSection,
    #[serde(default)]
    pub opener: OpenerSection,
    #[serde(default)]
    pub simulator: SimulatorSection,
}

/// General arbiter settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArbiterSection {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Retry behaviour of the device opener.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenerSection {
    /// Total open attempts per request, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pause between attempts in milliseconds.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

/// Cameras exposed by the simulated backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulatorSection {
    #[serde(default = "default_cameras")]
    pub cameras: Vec<String>,
    #[serde(default = "default_open_latency_ms")]
    pub open_latency_ms: u64,
    #[serde(default = "default_close_latency_ms")]
    pub close_latency_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_interval_ms() -> u64 {
    250
}
fn default_cameras() -> Vec<String> {
    vec!["0".to_string(), "1".to_string()]
}
fn default_open_latency_ms() -> u64 {
    50
}
fn default_close_latency_ms() -> u64 {
    100
}

impl Default for ArbiterSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for OpenerSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl Default for SimulatorSection {
    fn default() -> Self {
        Self {
            cameras: default_cameras(),
            open_latency_ms: default_open_latency_ms(),
            close_latency_ms: default_close_latency_ms(),
        }
    }
}

impl OpenerSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            retry_interval: Duration::from_millis(self.retry_interval_ms),
        }
    }
}

impl SimulatorSection {
    pub fn open_latency(&self) -> Duration {
        Duration::from_millis(self.open_latency_ms)
    }

    pub fn close_latency(&self) -> Duration {
        Duration::from_millis(self.close_latency_ms)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the platform config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads `ArbiterConfig` from `path`, returning the defaults if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<ArbiterConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ArbiterConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &ArbiterConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("CameraArbiter"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("camera-arbiter"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("CameraArbiter")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
