//! Per-utterance edge-frame averages.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use giztoy_noisevec::baseline;
use tracing::warn;

use super::{get_config, RunSummary};
use crate::archive::{matrix_from_rows, ArchiveReader, ArchiveWriter};
use crate::Cli;

/// Average the first and last frames of each utterance.
///
/// Leading and trailing frames are usually silence, so their mean is a
/// label-free noise estimate of length d.
#[derive(Args)]
pub struct EdgesCommand {
    /// Frame features archive
    features: String,

    /// Output vectors archive
    #[arg(default_value = "-")]
    output: String,

    /// Frames averaged at each edge (default from config)
    #[arg(short = 'n', long)]
    frames: Option<usize>,

    /// Write the run summary to this file
    #[arg(long)]
    summary: Option<PathBuf>,
}

impl EdgesCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let cfg = get_config(cli)?;
        let n = self.frames.unwrap_or(cfg.edge_frames);
        if n == 0 {
            anyhow::bail!("edge frame count must be positive");
        }

        let mut writer = ArchiveWriter::create(&self.output)?;
        let mut summary = RunSummary::default();
        for entry in ArchiveReader::<Vec<Vec<f64>>>::open(&self.features)? {
            let (key, rows) = entry?;
            let feats = matrix_from_rows(&rows).with_context(|| format!("features {key}"))?;
            if feats.nrows() == 0 {
                warn!(utterance = %key, "empty features, skipping");
                summary.errors += 1;
                continue;
            }
            let v = baseline::edge_vector(&feats, n)?;
            writer.write_vector(&key, &v)?;
            summary.processed += 1;
        }
        writer.finish()?;

        summary.finish(cli, self.summary.as_ref())
    }
}
