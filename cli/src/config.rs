//! Configuration management for CLI tools.
//!
//! Configuration is stored in ~/.giztoy/{app_name}/config.yaml. A missing
//! file is not an error: every field has a default, and command-line flags
//! override whatever the file sets.

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::paths::Paths;

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot determine config path: {0}")]
    NoPath(#[source] io::Error),

    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Noise vector tool settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name (not serialized).
    #[serde(skip)]
    pub app_name: String,

    /// Frames per emitted vector in online extraction.
    pub period: usize,

    /// Write priors in binary form.
    pub binary: bool,

    /// Initial evidence weight `r_s = r_n` of an estimated prior.
    pub scale: f64,

    /// Frames averaged at each edge for edge vectors.
    pub edge_frames: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            period: 10,
            binary: true,
            scale: 1.0,
            edge_frames: 10,
        }
    }
}

impl Config {
    /// Gets the default config file path.
    pub fn default_config_path(app_name: &str) -> Result<PathBuf, ConfigError> {
        Ok(Paths::new(app_name).map_err(ConfigError::NoPath)?.config_file())
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period == 0 {
            return Err(ConfigError::Invalid("period must be positive".into()));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "scale must be finite and positive, got {}",
                self.scale
            )));
        }
        if self.edge_frames == 0 {
            return Err(ConfigError::Invalid("edge_frames must be positive".into()));
        }
        Ok(())
    }
}

/// Loads configuration for the specified app.
///
/// Reads `custom_path` if given, else ~/.giztoy/{app_name}/config.yaml.
/// Returns defaults when the file does not exist.
pub fn load_config(app_name: &str, custom_path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match custom_path {
        Some(p) => p.to_path_buf(),
        None => Config::default_config_path(app_name)?,
    };

    let mut cfg = match std::fs::read_to_string(&config_path) {
        Ok(content) if content.trim().is_empty() => Config::default(),
        Ok(content) => serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: config_path.clone(),
            source,
        })?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Config::default(),
        Err(source) => {
            return Err(ConfigError::Read {
                path: config_path,
                source,
            });
        }
    };
    cfg.validate()?;

    cfg.app_name = app_name.to_string();

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let cfg = load_config("noisevec", Some(&path)).unwrap();
        assert_eq!(cfg.period, 10);
        assert!(cfg.binary);
        assert_eq!(cfg.scale, 1.0);
        assert_eq!(cfg.edge_frames, 10);
        assert_eq!(cfg.app_name, "noisevec");
        assert!(!path.exists());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "period: 25\nbinary: false\n").unwrap();
        let cfg = load_config("noisevec", Some(&path)).unwrap();
        assert_eq!(cfg.period, 25);
        assert!(!cfg.binary);
        assert_eq!(cfg.scale, 1.0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "period: 0\n").unwrap();
        assert!(matches!(
            load_config("noisevec", Some(&path)),
            Err(ConfigError::Invalid(_))
        ));

        std::fs::write(&path, "scale: [1, 2]\n").unwrap();
        assert!(matches!(
            load_config("noisevec", Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn default_path_is_under_home() {
        let path = Config::default_config_path("noisevec").unwrap();
        assert!(path.ends_with(".giztoy/noisevec/config.yaml"));
    }
}
