//! Output utilities for CLI tools.

use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// YAML format (default).
    #[default]
    Yaml,
    /// JSON format.
    Json,
}

impl OutputFormat {
    /// JSON when `json` is set, YAML otherwise.
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Yaml }
    }
}

/// Output configuration for summaries and reports.
#[derive(Debug, Clone)]
pub struct Output {
    pub format: OutputFormat,
    pub file: Option<PathBuf>,
}

impl Output {
    /// Creates a new output configuration. `None` writes to stdout.
    pub fn new(format: OutputFormat, file: Option<PathBuf>) -> Self {
        Self { format, file }
    }

    /// Renders `value` in the configured format.
    pub fn render<T: Serialize>(&self, value: &T) -> anyhow::Result<String> {
        Ok(match self.format {
            OutputFormat::Yaml => serde_yaml::to_string(value)?,
            OutputFormat::Json => serde_json::to_string_pretty(value)? + "\n",
        })
    }

    /// Outputs the result.
    pub fn write<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        let output = self.render(value)?;
        match &self.file {
            Some(path) => std::fs::write(path, output)?,
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(output.as_bytes())?;
                stdout.flush()?;
            }
        }
        Ok(())
    }
}
