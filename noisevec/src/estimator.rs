use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::error::{NoiseVecError, Result};
use crate::linalg::solve_system;
use crate::prior::{scaling_ratio, NoisePrior};
use crate::stats::SufficientStats;

/// Number of vectors emitted for `frames` frames at the given period.
pub fn num_chunks(frames: usize, period: usize) -> usize {
    frames.div_ceil(period)
}

/// Incremental MAP estimator of combined speech/noise vectors.
///
/// Create one per session (for example one per speaker) so that the
/// adapted scales `r_s`/`r_n` and the accumulated statistics carry over
/// between that session's utterances. Statistics are never reset.
///
/// # Algorithm
///
/// Frames are consumed in chunks of `period`. For every chunk the estimator
///
/// 1. adds each frame to the speech or noise statistics,
/// 2. solves `K x = Q` for the posterior mode `x` (speech half, noise half),
/// 3. re-estimates `r_s = d·num_speech / trace(Lambda_s · Σ x xᵗ)` over
///    speech frames, and likewise `r_n`,
/// 4. emits `x`.
///
/// With `Ls = Lambda_s`, `Ln = Lambda_n`:
///
/// ```text
/// K = | (1 + r_s·N_s)·Ls        -Ls·B                    |
///     | -Bᵗ·Ls                  (1 + r_n·N_n)·Ln + BᵗLsB |
///
/// Q = | Ls·(a + r_s·Σ speech)             |
///     | Ln·(mu_n + r_n·Σ noise) + Bᵗ·Ls·a |
/// ```
#[derive(Debug, Clone)]
pub struct OnlineEstimator {
    prior: NoisePrior,
    period: usize,
    current: DVector<f64>,
    stats: SufficientStats,
}

impl OnlineEstimator {
    /// Creates an estimator seeded with a copy of `prior`.
    pub fn new(prior: &NoisePrior, period: usize) -> Result<Self> {
        if period == 0 {
            return Err(NoiseVecError::InvalidArgument(
                "period must be positive".into(),
            ));
        }
        Ok(Self {
            prior: prior.clone(),
            period,
            current: DVector::zeros(prior.dim()),
            stats: SufficientStats::new(prior.half_dim()),
        })
    }

    /// Extracts one combined vector per chunk of `period` frames.
    ///
    /// `features` holds one frame per row; `silence[i]` labels row `i`.
    /// Returns a `⌈T/period⌉ × 2d` matrix. The last chunk may be short.
    pub fn extract_vectors(
        &mut self,
        features: &DMatrix<f64>,
        silence: &[bool],
    ) -> Result<DMatrix<f64>> {
        self.check_features(features)?;
        let frames = features.nrows();
        if silence.len() != frames {
            return Err(NoiseVecError::DimensionMismatch {
                expected: frames,
                got: silence.len(),
            });
        }

        let rows = num_chunks(frames, self.period);
        let mut vectors = DMatrix::zeros(rows, self.dim());
        for chunk in 0..rows {
            let start = chunk * self.period;
            let end = (start + self.period).min(frames);
            self.update_vector(features, start, &silence[start..end])?;
            self.update_scaling_params();
            debug!(
                chunk,
                frames = end - start,
                num_speech = self.stats.num_speech(),
                num_noise = self.stats.num_noise(),
                r_s = self.prior.r_s(),
                r_n = self.prior.r_n(),
                "updated noise vector"
            );
            vectors.set_row(chunk, &self.current.transpose());
        }
        Ok(vectors)
    }

    /// Extracts vectors without labels: every row is the prior's
    /// zero-evidence vector `(a + B·mu_n, mu_n)`. State is not touched.
    pub fn extract_prior_vectors(&self, features: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.check_features(features)?;
        let rows = num_chunks(features.nrows(), self.period);
        let row = self.prior.zero_evidence_vector().transpose();
        let mut vectors = DMatrix::zeros(rows, self.dim());
        for i in 0..rows {
            vectors.set_row(i, &row);
        }
        Ok(vectors)
    }

    /// Dispatches to [`extract_vectors`](Self::extract_vectors) when labels
    /// are available and to [`extract_prior_vectors`](Self::extract_prior_vectors)
    /// otherwise.
    pub fn extract(
        &mut self,
        features: &DMatrix<f64>,
        silence: Option<&[bool]>,
    ) -> Result<DMatrix<f64>> {
        match silence {
            Some(labels) => self.extract_vectors(features, labels),
            None => self.extract_prior_vectors(features),
        }
    }

    fn check_features(&self, features: &DMatrix<f64>) -> Result<()> {
        if features.ncols() != self.stats.dim() {
            return Err(NoiseVecError::DimensionMismatch {
                expected: self.stats.dim(),
                got: features.ncols(),
            });
        }
        Ok(())
    }

    /// Accumulates the chunk starting at row `start` and re-solves for the
    /// current vector.
    fn update_vector(
        &mut self,
        features: &DMatrix<f64>,
        start: usize,
        silence: &[bool],
    ) -> Result<()> {
        for (offset, &is_silence) in silence.iter().enumerate() {
            let frame = features.row(start + offset).transpose();
            self.stats.update(&frame, is_silence)?;
        }

        let (k, q) = self.build_system();
        self.current = solve_system(k, &q)?;
        Ok(())
    }

    fn build_system(&self) -> (DMatrix<f64>, DVector<f64>) {
        let d = self.stats.dim();
        let p = &self.prior;
        let ls = p.lambda_s();
        let ln = p.lambda_n();
        let b = p.b();
        let speech_weight = 1.0 + p.r_s() * self.stats.num_speech() as f64;
        let noise_weight = 1.0 + p.r_n() * self.stats.num_noise() as f64;

        let ls_b = ls * b;
        let bt_ls = b.transpose() * ls;

        let mut k = DMatrix::zeros(2 * d, 2 * d);
        k.view_mut((0, 0), (d, d)).copy_from(&(ls * speech_weight));
        k.view_mut((0, d), (d, d)).copy_from(&(-&ls_b));
        k.view_mut((d, 0), (d, d)).copy_from(&(-&bt_ls));
        k.view_mut((d, d), (d, d))
            .copy_from(&(ln * noise_weight + &bt_ls * b));

        let speech_term = p.a() + self.stats.speech_sum() * p.r_s();
        let noise_term = p.mu_n() + self.stats.noise_sum() * p.r_n();
        let mut q = DVector::zeros(2 * d);
        q.rows_mut(0, d).copy_from(&(ls * speech_term));
        q.rows_mut(d, d)
            .copy_from(&(ln * noise_term + &bt_ls * p.a()));

        (k, q)
    }

    /// Re-estimates `r_s` and `r_n` from the cumulative statistics. A class
    /// with no frames so far keeps its current scale.
    fn update_scaling_params(&mut self) {
        let d = self.stats.dim() as f64;
        let r_s = scaling_ratio(
            d,
            self.stats.num_speech(),
            self.prior.lambda_s(),
            self.stats.speech_outer_sum(),
        )
        .unwrap_or(self.prior.r_s());
        let r_n = scaling_ratio(
            d,
            self.stats.num_noise(),
            self.prior.lambda_n(),
            self.stats.noise_outer_sum(),
        )
        .unwrap_or(self.prior.r_n());
        self.prior.set_scales(r_s, r_n);
    }

    /// Combined vector dimension (`2d`).
    pub fn dim(&self) -> usize {
        self.prior.dim()
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Most recent estimate; zero until the first labeled chunk.
    pub fn current_vector(&self) -> &DVector<f64> {
        &self.current
    }

    /// Current speech scale.
    pub fn r_s(&self) -> f64 {
        self.prior.r_s()
    }

    /// Current noise scale.
    pub fn r_n(&self) -> f64 {
        self.prior.r_n()
    }

    pub fn stats(&self) -> &SufficientStats {
        &self.stats
    }

    /// The estimator's copy of the prior, including adapted scales.
    pub fn prior(&self) -> &NoisePrior {
        &self.prior
    }
}
