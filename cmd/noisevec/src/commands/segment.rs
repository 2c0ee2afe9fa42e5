//! Per-utterance segment averages.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use giztoy_noisevec::baseline;
use tracing::warn;

use super::{lookup_labels, RunSummary};
use crate::archive::{matrix_from_rows, read_matrix_map, ArchiveReader, ArchiveWriter};
use crate::Cli;

/// Average speech frames and silence frames of each utterance.
///
/// Writes one vector of length 2d per utterance: the speech mean followed
/// by the silence mean. A class with no frames, or an utterance without
/// usable targets, contributes zeros. The output is suitable training
/// input for `noisevec prior`.
#[derive(Args)]
pub struct SegmentCommand {
    /// Frame features archive
    features: String,

    /// Frame targets archive (silence, speech, garbage scores)
    targets: String,

    /// Output vectors archive
    #[arg(default_value = "-")]
    output: String,

    /// Write the run summary to this file
    #[arg(long)]
    summary: Option<PathBuf>,
}

impl SegmentCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let targets = read_matrix_map(&self.targets)?;
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
            let labels = lookup_labels(Some(&targets), &key, feats.nrows());
            if labels.is_none() {
                summary.fallback += 1;
            }
            let v = baseline::segment_vector(&feats, labels.as_deref())?;
            writer.write_vector(&key, &v)?;
            summary.processed += 1;
        }
        writer.finish()?;

        summary.finish(cli, self.summary.as_ref())
    }
}
