//! CLI commands module.

mod copy;
mod edges;
mod online;
mod prior;
mod segment;
mod show;

pub use copy::CopyCommand;
pub use edges::EdgesCommand;
pub use online::OnlineCommand;
pub use prior::PriorCommand;
pub use segment::SegmentCommand;
pub use show::ShowCommand;

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use giztoy_cli::{Config, Output, OutputFormat};
use giztoy_noisevec::silence_decisions;
use nalgebra::DMatrix;
use serde::Serialize;
use tracing::{info, warn};

use crate::Cli;

pub(crate) const APP_NAME: &str = "noisevec";

/// Loads the config file named by `--config`, or the default one.
pub(crate) fn get_config(cli: &Cli) -> anyhow::Result<Config> {
    giztoy_cli::load_config(APP_NAME, cli.config.as_deref()).context("load config")
}

/// Output for summaries, honoring `--json`.
pub(crate) fn output(cli: &Cli, file: Option<PathBuf>) -> Output {
    Output::new(OutputFormat::from_json_flag(cli.json), file)
}

/// Prior file mode flags shared by commands that write priors.
#[derive(Args, Debug, Clone, Default)]
pub struct ModeArgs {
    /// Write the prior in binary form
    #[arg(long, conflicts_with = "text")]
    pub binary: bool,

    /// Write the prior in text form
    #[arg(long)]
    pub text: bool,
}

impl ModeArgs {
    pub fn binary(&self, cfg: &Config) -> bool {
        if self.binary {
            true
        } else if self.text {
            false
        } else {
            cfg.binary
        }
    }
}

/// Per-run counts of a command that processes utterances.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub errors: usize,
    /// Utterances that fell back to the label-free path.
    #[serde(skip_serializing_if = "is_zero")]
    pub fallback: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl RunSummary {
    /// Logs the counts, writes them to `summary` if given, and fails the
    /// run if nothing was processed.
    pub fn finish(self, cli: &Cli, summary: Option<&PathBuf>) -> anyhow::Result<()> {
        info!(
            processed = self.processed,
            errors = self.errors,
            fallback = self.fallback,
            "done"
        );
        if let Some(path) = summary {
            output(cli, Some(path.clone())).write(&self)?;
        }
        if self.processed == 0 {
            anyhow::bail!("no utterances processed ({} errors)", self.errors);
        }
        Ok(())
    }
}

/// Looks up silence decisions for `key`.
///
/// Returns `None`, after logging why, when the targets have no entry for
/// the utterance or the entry does not fit the features.
pub(crate) fn lookup_labels(
    targets: Option<&HashMap<String, DMatrix<f64>>>,
    key: &str,
    num_frames: usize,
) -> Option<Vec<bool>> {
    let targets = targets?;
    let Some(t) = targets.get(key) else {
        warn!(utterance = key, "no targets for utterance");
        return None;
    };
    match silence_decisions(t, Some(num_frames)) {
        Ok(labels) => Some(labels),
        Err(e) => {
            warn!(utterance = key, error = %e, "unusable targets for utterance");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_fall_back_on_missing_or_mismatched_targets() {
        let mut targets = HashMap::new();
        targets.insert(
            "good".to_string(),
            DMatrix::from_row_slice(2, 3, &[0.0, 1.0, 0.0, 1.0, 0.0, 0.0]),
        );
        targets.insert("narrow".to_string(), DMatrix::zeros(2, 2));

        assert_eq!(lookup_labels(Some(&targets), "good", 2), Some(vec![false, true]));
        assert_eq!(lookup_labels(Some(&targets), "good", 3), None);
        assert_eq!(lookup_labels(Some(&targets), "narrow", 2), None);
        assert_eq!(lookup_labels(Some(&targets), "missing", 2), None);
        assert_eq!(lookup_labels(None, "good", 2), None);
    }

    #[test]
    fn mode_flags_override_config() {
        let cfg = Config::default();
        assert!(ModeArgs::default().binary(&cfg));
        let text = ModeArgs {
            binary: false,
            text: true,
        };
        assert!(!text.binary(&cfg));
    }
}
