//! Where the noisevec tools keep their per-user files.
//!
//! Everything lives under one hidden directory in the home directory,
//! shared with the other giztoy tools:
//!
//! ```text
//! ~/.giztoy/
//!   noisevec/
//!     config.yaml    default period, prior mode, scale and edge width
//! ```

use std::io;
use std::path::PathBuf;

/// Hidden directory in `$HOME` shared by all tools.
pub const DEFAULT_BASE_DIR: &str = ".giztoy";

/// Name of the settings file inside a tool's directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Per-user locations for one tool, such as `noisevec`.
#[derive(Debug, Clone)]
pub struct Paths {
    pub app_name: String,
    pub home_dir: PathBuf,
}

impl Paths {
    /// Resolves the home directory. Fails when it cannot be determined,
    /// for example under a service account without `$HOME`.
    pub fn new(app_name: impl Into<String>) -> io::Result<Self> {
        let home_dir = dirs::home_dir().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "could not find home directory")
        })?;
        Ok(Self {
            app_name: app_name.into(),
            home_dir,
        })
    }

    pub fn base_dir(&self) -> PathBuf {
        self.home_dir.join(DEFAULT_BASE_DIR)
    }

    /// The tool's own directory. Nothing creates it; without it the
    /// defaults apply.
    pub fn app_dir(&self) -> PathBuf {
        self.base_dir().join(&self.app_name)
    }

    /// Settings file read by `load_config` when no `--config` is given.
    pub fn config_file(&self) -> PathBuf {
        self.app_dir().join(DEFAULT_CONFIG_FILE)
    }
}
