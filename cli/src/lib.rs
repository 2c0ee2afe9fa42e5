//! CLI utilities for giztoy.
//!
//! This crate provides common utilities for CLI applications: per-app
//! configuration under `~/.giztoy/<app>/`, and YAML/JSON output.

pub mod config;
pub mod output;
pub mod paths;

pub use config::{load_config, Config, ConfigError};
pub use output::{Output, OutputFormat};
pub use paths::Paths;
