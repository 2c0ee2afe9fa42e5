//! Prior estimation from training vectors.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use giztoy_noisevec::{NoisePrior, NoiseVectorSet, SufficientStats};
use nalgebra::DVector;
use tracing::{info, warn};

use super::{get_config, lookup_labels, ModeArgs, RunSummary};
use crate::archive::{matrix_from_rows, read_matrix_map, ArchiveReader};
use crate::Cli;

/// Estimate a noise prior from per-utterance training vectors.
///
/// The vectors archive maps each utterance to a combined speech/noise
/// vector of length 2d, for example the output of `noisevec segment`.
/// With `--features` and `--targets`, the initial scales r_s and r_n are
/// fitted to the labeled frames instead of set to `--scale`.
#[derive(Args)]
pub struct PriorCommand {
    /// Training vectors archive
    vectors: String,

    /// Output prior file
    prior: PathBuf,

    /// Initial evidence weight r_s = r_n (default from config)
    #[arg(long, conflicts_with = "features")]
    scale: Option<f64>,

    /// Frame features archive for fitting the scales
    #[arg(long, requires = "targets")]
    features: Option<String>,

    /// Frame targets archive for fitting the scales
    #[arg(long, requires = "features")]
    targets: Option<String>,

    /// Write the run summary to this file
    #[arg(long)]
    summary: Option<PathBuf>,

    #[command(flatten)]
    mode: ModeArgs,
}

impl PriorCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let cfg = get_config(cli)?;

        let mut set = NoiseVectorSet::new();
        let mut summary = RunSummary::default();
        for entry in ArchiveReader::<Vec<f64>>::open(&self.vectors)? {
            let (key, values) = entry?;
            match set.insert(key.as_str(), DVector::from_vec(values)) {
                Ok(true) => summary.processed += 1,
                Ok(false) => summary.errors += 1,
                Err(e) => {
                    warn!(utterance = %key, error = %e, "skipping training vector");
                    summary.errors += 1;
                }
            }
        }
        info!(vectors = set.len(), duplicates = set.num_duplicates(), "read training vectors");

        let prior = match (&self.features, &self.targets) {
            (Some(features), Some(targets)) => {
                if cfg.scale != 1.0 {
                    warn!(scale = cfg.scale, "configured scale is replaced by fitted scales");
                }
                let mean = set.mean()?;
                let covariance = set.covariance()?;
                let stats = self.frame_stats(features, targets, mean.len() / 2)?;
                NoisePrior::estimate_with_stats(&mean, &covariance, &stats)?
            }
            _ => set.estimate_prior(self.scale.unwrap_or(cfg.scale))?,
        };
        info!(dim = prior.dim(), r_s = prior.r_s(), r_n = prior.r_n(), "estimated prior");

        let binary = self.mode.binary(&cfg);
        prior
            .save(&self.prior, binary)
            .with_context(|| format!("write prior {}", self.prior.display()))?;

        summary.finish(cli, self.summary.as_ref())
    }

    /// Accumulates labeled frames of every utterance that has targets.
    fn frame_stats(
        &self,
        features: &str,
        targets: &str,
        dim: usize,
    ) -> anyhow::Result<SufficientStats> {
        let targets = read_matrix_map(targets)?;
        let mut stats = SufficientStats::new(dim);
        for entry in ArchiveReader::<Vec<Vec<f64>>>::open(features)? {
            let (key, rows) = entry?;
            let feats = matrix_from_rows(&rows).with_context(|| format!("features {key}"))?;
            if feats.nrows() == 0 {
                warn!(utterance = %key, "empty features");
                continue;
            }
            if feats.ncols() != dim {
                anyhow::bail!(
                    "features {key} have dimension {}, training vectors have {dim}",
                    feats.ncols()
                );
            }
            let Some(labels) = lookup_labels(Some(&targets), &key, feats.nrows()) else {
                continue;
            };
            for (i, &is_silence) in labels.iter().enumerate() {
                stats.update(&feats.row(i).transpose(), is_silence)?;
            }
        }
        info!(
            num_speech = stats.num_speech(),
            num_noise = stats.num_noise(),
            "accumulated frame statistics"
        );
        Ok(stats)
    }
}
