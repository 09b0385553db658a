//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration file, falls back to
//! defaults when it does not exist yet, and writes a default file on request.

pub mod config;
