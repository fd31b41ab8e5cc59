//! Parsing and validation of `circa.toml` simulation configuration files.
//!
//! This crate reads the optional configuration file and produces a
//! strongly-typed [`SimConfig`] with propagation limits, analysis limits and
//! the retry policy used when snapshotting dirty sets. Every field has a
//! default, so an empty file (or [`SimConfig::default`]) is a valid setup.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE_NAME};
pub use types::*;
