//! Online vector extraction.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use giztoy_noisevec::{baseline, NoisePrior, NoiseVecError, OnlineEstimator};
use nalgebra::DMatrix;
use tracing::{debug, error, info, warn};

use super::{get_config, lookup_labels, RunSummary};
use crate::archive::{matrix_from_rows, read_matrix_map, read_utt2spk, ArchiveReader, ArchiveWriter};
use crate::Cli;

/// Extract one speech/noise vector every `period` frames.
///
/// With a prior, each vector is the MAP estimate given all frames of the
/// session so far. Utterances without usable targets get the prior's
/// zero-evidence vector. Without a prior, each vector holds the running
/// speech and silence means.
///
/// With `--utt2spk`, utterances of one speaker share an estimator so the
/// adapted scales carry over; otherwise every utterance starts fresh.
#[derive(Args)]
pub struct OnlineCommand {
    /// Frame features archive
    features: String,

    /// Output vectors archive
    #[arg(default_value = "-")]
    output: String,

    /// Prior file; omit for running means
    #[arg(long)]
    prior: Option<PathBuf>,

    /// Frame targets archive (silence, speech, garbage scores)
    #[arg(long)]
    targets: Option<String>,

    /// Utterance-to-speaker map
    #[arg(long)]
    utt2spk: Option<PathBuf>,

    /// Frames per output vector (default from config)
    #[arg(long)]
    period: Option<usize>,

    /// Write the run summary to this file
    #[arg(long)]
    summary: Option<PathBuf>,
}

/// Estimators keyed by session.
struct Sessions {
    prior: NoisePrior,
    period: usize,
    utt2spk: Option<HashMap<String, String>>,
    estimators: HashMap<String, OnlineEstimator>,
}

impl Sessions {
    /// Returns the estimator for the utterance's speaker, or a fresh one
    /// when utterances are not grouped.
    fn extract(
        &mut self,
        key: &str,
        features: &DMatrix<f64>,
        labels: Option<&[bool]>,
    ) -> giztoy_noisevec::Result<DMatrix<f64>> {
        let Some(utt2spk) = &self.utt2spk else {
            return OnlineEstimator::new(&self.prior, self.period)?.extract(features, labels);
        };
        let speaker = match utt2spk.get(key) {
            Some(spk) => spk.clone(),
            None => {
                warn!(utterance = key, "no speaker for utterance, using its own session");
                key.to_string()
            }
        };
        let est = match self.estimators.entry(speaker) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(OnlineEstimator::new(&self.prior, self.period)?)
            }
        };
        let out = est.extract(features, labels)?;
        debug!(utterance = key, r_s = est.r_s(), r_n = est.r_n(), "session scales");
        Ok(out)
    }
}

impl OnlineCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let cfg = get_config(cli)?;
        let period = self.period.unwrap_or(cfg.period);
        if period == 0 {
            anyhow::bail!("period must be positive");
        }

        let targets = self.targets.as_deref().map(read_matrix_map).transpose()?;
        let utt2spk = self.utt2spk.as_deref().map(read_utt2spk).transpose()?;
        let mut sessions = match &self.prior {
            Some(path) => {
                let prior = NoisePrior::load(path)
                    .with_context(|| format!("read prior {}", path.display()))?;
                info!(dim = prior.dim(), r_s = prior.r_s(), r_n = prior.r_n(), "loaded prior");
                Some(Sessions {
                    prior,
                    period,
                    utt2spk,
                    estimators: HashMap::new(),
                })
            }
            None => None,
        };

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

            let labels = lookup_labels(targets.as_ref(), &key, feats.nrows());
            if labels.is_none() {
                summary.fallback += 1;
            }

            let result = match sessions.as_mut() {
                Some(sessions) => {
                    if feats.ncols() != sessions.prior.half_dim() {
                        anyhow::bail!(
                            "features {key} have dimension {}, prior expects {}",
                            feats.ncols(),
                            sessions.prior.half_dim()
                        );
                    }
                    sessions.extract(&key, &feats, labels.as_deref())
                }
                None => baseline::running_mean_vectors(&feats, labels.as_deref(), period),
            };
            match result {
                Ok(vectors) => {
                    writer.write_matrix(&key, &vectors)?;
                    summary.processed += 1;
                }
                Err(e @ NoiseVecError::Numerical(_)) => {
                    error!(utterance = %key, error = %e, "extraction failed");
                    summary.errors += 1;
                }
                Err(e) => return Err(e).with_context(|| format!("utterance {key}")),
            }
        }
        writer.finish()?;

        summary.finish(cli, self.summary.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use clap::Parser;
    use giztoy_noisevec::{NoisePrior, OnlineEstimator};
    use nalgebra::{DMatrix, DVector};

    use crate::archive::{matrix_from_rows, ArchiveReader};
    use crate::Cli;

    fn scalar_prior() -> NoisePrior {
        NoisePrior::from_parts(
            DVector::from_vec(vec![1.0]),
            DVector::from_vec(vec![0.5]),
            DMatrix::from_row_slice(1, 1, &[0.2]),
            DMatrix::from_row_slice(1, 1, &[2.0]),
            DMatrix::from_row_slice(1, 1, &[4.0]),
            1.0,
            1.0,
        )
        .unwrap()
    }

    fn read_output(path: &Path) -> Vec<(String, DMatrix<f64>)> {
        ArchiveReader::<Vec<Vec<f64>>>::open(path.to_str().unwrap())
            .unwrap()
            .map(|e| {
                let (k, rows) = e.unwrap();
                (k, matrix_from_rows(&rows).unwrap())
            })
            .collect()
    }

    fn run(dir: &Path, extra: &[&str]) -> anyhow::Result<()> {
        let config = dir.join("config.yaml");
        let mut args = vec![
            "noisevec".to_string(),
            "--config".to_string(),
            config.to_str().unwrap().to_string(),
            "online".to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        Cli::try_parse_from(args).unwrap().run()
    }

    #[test]
    fn missing_targets_fall_back_to_prior_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let prior_path = dir.path().join("prior.bin");
        scalar_prior().save(&prior_path, true).unwrap();

        let feats = dir.path().join("feats.jsonl");
        std::fs::write(
            &feats,
            [
                r#"{"key":"labeled","value":[[2.0],[3.0]]}"#,
                r#"{"key":"unlabeled","value":[[0.3],[0.1],[0.2],[0.4]]}"#,
                r#"{"key":"empty","value":[]}"#,
            ]
            .join("\n"),
        )
        .unwrap();
        let targets = dir.path().join("targets.jsonl");
        std::fs::write(
            &targets,
            r#"{"key":"labeled","value":[[0.1,0.8,0.1],[0.9,0.05,0.05]]}"#,
        )
        .unwrap();
        let out = dir.path().join("out.jsonl");
        let summary = dir.path().join("summary.yaml");

        run(
            dir.path(),
            &[
                feats.to_str().unwrap(),
                out.to_str().unwrap(),
                "--prior",
                prior_path.to_str().unwrap(),
                "--targets",
                targets.to_str().unwrap(),
                "--period",
                "3",
                "--summary",
                summary.to_str().unwrap(),
            ],
        )
        .unwrap();

        let output = read_output(&out);
        assert_eq!(output.len(), 2);

        let prior = scalar_prior();
        let mut est = OnlineEstimator::new(&prior, 3).unwrap();
        let expected = est
            .extract_vectors(&DMatrix::from_column_slice(2, 1, &[2.0, 3.0]), &[false, true])
            .unwrap();
        assert_eq!(output[0].0, "labeled");
        assert_eq!(output[0].1, expected);

        let fallback = OnlineEstimator::new(&prior, 3)
            .unwrap()
            .extract_prior_vectors(&DMatrix::from_column_slice(4, 1, &[0.3, 0.1, 0.2, 0.4]))
            .unwrap();
        assert_eq!(output[1].0, "unlabeled");
        assert_eq!(output[1].1, fallback);

        let summary = std::fs::read_to_string(summary).unwrap();
        assert!(summary.contains("processed: 2"), "{summary}");
        assert!(summary.contains("errors: 1"), "{summary}");
        assert!(summary.contains("fallback: 1"), "{summary}");
    }

    #[test]
    fn speakers_share_an_estimator() {
        let dir = tempfile::tempdir().unwrap();
        let prior_path = dir.path().join("prior.txt");
        scalar_prior().save(&prior_path, false).unwrap();

        let feats = dir.path().join("feats.jsonl");
        std::fs::write(
            &feats,
            [
                r#"{"key":"a1","value":[[2.0],[3.0]]}"#,
                r#"{"key":"a2","value":[[2.0],[3.0]]}"#,
            ]
            .join("\n"),
        )
        .unwrap();
        let targets = dir.path().join("targets.jsonl");
        let t = r#"[[0.1,0.8,0.1],[0.9,0.05,0.05]]"#;
        std::fs::write(
            &targets,
            format!("{{\"key\":\"a1\",\"value\":{t}}}\n{{\"key\":\"a2\",\"value\":{t}}}\n"),
        )
        .unwrap();
        let utt2spk = dir.path().join("utt2spk");
        std::fs::write(&utt2spk, "a1 spk\na2 spk\n").unwrap();
        let out = dir.path().join("out.jsonl");

        run(
            dir.path(),
            &[
                feats.to_str().unwrap(),
                out.to_str().unwrap(),
                "--prior",
                prior_path.to_str().unwrap(),
                "--targets",
                targets.to_str().unwrap(),
                "--utt2spk",
                utt2spk.to_str().unwrap(),
            ],
        )
        .unwrap();

        let output = read_output(&out);
        let feats = DMatrix::from_column_slice(2, 1, &[2.0, 3.0]);
        let mut est = OnlineEstimator::new(&scalar_prior(), 10).unwrap();
        let first = est.extract_vectors(&feats, &[false, true]).unwrap();
        let second = est.extract_vectors(&feats, &[false, true]).unwrap();
        assert_eq!(output[0].1, first);
        assert_eq!(output[1].1, second);
        assert_ne!(first, second);
    }

    #[test]
    fn running_means_without_prior() {
        let dir = tempfile::tempdir().unwrap();
        let feats = dir.path().join("feats.jsonl");
        std::fs::write(&feats, r#"{"key":"u","value":[[1.0],[3.0],[5.0]]}"#).unwrap();
        let targets = dir.path().join("targets.jsonl");
        std::fs::write(
            &targets,
            r#"{"key":"u","value":[[0,1,0],[1,0,0],[0,1,0]]}"#,
        )
        .unwrap();
        let out = dir.path().join("out.jsonl");

        run(
            dir.path(),
            &[
                feats.to_str().unwrap(),
                out.to_str().unwrap(),
                "--targets",
                targets.to_str().unwrap(),
                "--period",
                "2",
            ],
        )
        .unwrap();

        let output = read_output(&out);
        assert_eq!(
            output[0].1,
            DMatrix::from_row_slice(2, 2, &[1.0, 3.0, 3.0, 3.0])
        );
    }

    #[test]
    fn nothing_processed_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let feats = dir.path().join("feats.jsonl");
        std::fs::write(&feats, r#"{"key":"u","value":[]}"#).unwrap();
        let out = dir.path().join("out.jsonl");
        let err = run(dir.path(), &[feats.to_str().unwrap(), out.to_str().unwrap()]).unwrap_err();
        assert!(err.to_string().contains("no utterances processed"), "{err}");
    }

    #[test]
    fn prior_dimension_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let prior_path = dir.path().join("prior.bin");
        scalar_prior().save(&prior_path, true).unwrap();
        let feats = dir.path().join("feats.jsonl");
        std::fs::write(&feats, r#"{"key":"u","value":[[1.0,2.0]]}"#).unwrap();
        let out = dir.path().join("out.jsonl");
        assert!(
            run(
                dir.path(),
                &[
                    feats.to_str().unwrap(),
                    out.to_str().unwrap(),
                    "--prior",
                    prior_path.to_str().unwrap(),
                ],
            )
            .is_err()
        );
    }
}
