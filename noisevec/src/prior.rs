use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::codec::{Decoder, Encoder};
use crate::error::{NoiseVecError, Result};
use crate::linalg::{invert, is_finite, solve_matrix, symmetrize, trace_mat_mat};
use crate::stats::SufficientStats;

const START_MARKER: &str = "<NoisePrior>";
const END_MARKER: &str = "</NoisePrior>";

/// Header that marks a binary prior file. Text files carry no header.
const BINARY_HEADER: &[u8] = b"\0B";

/// Conjugate-Gaussian prior over joint speech/noise vectors.
///
/// The noise half is modeled as `N(mu_n, Lambda_n⁻¹)` and the speech half,
/// conditioned on the noise half, as `N(a + B·n, Lambda_s⁻¹)`. The scalars
/// `r_s` and `r_n` weight per-frame evidence against the prior.
///
/// A prior is estimated once from training data and is read-only afterwards.
/// [`OnlineEstimator`](crate::OnlineEstimator) takes its own copy, so one
/// prior can seed any number of concurrent estimators.
#[derive(Debug, Clone, PartialEq)]
pub struct NoisePrior {
    mu_n: DVector<f64>,
    a: DVector<f64>,
    b: DMatrix<f64>,
    lambda_n: DMatrix<f64>,
    lambda_s: DMatrix<f64>,
    r_s: f64,
    r_n: f64,
}

impl NoisePrior {
    /// Estimates the prior from the mean and covariance of training vectors.
    ///
    /// `mean` has length `2d` (speech half first) and `covariance` is
    /// `2d×2d`. With `Λ = covariance⁻¹` partitioned into d×d blocks:
    ///
    /// - `Lambda_s = Λ_ss`
    /// - `Lambda_n = (covariance_nn)⁻¹`, the inverse of the noise marginal block
    /// - `B = -Λ_ss⁻¹ Λ_sn`, `a = mu_s - B mu_n`
    /// - `r_s = r_n = scale`
    pub fn estimate(mean: &DVector<f64>, covariance: &DMatrix<f64>, scale: f64) -> Result<Self> {
        let dim = mean.len();
        if dim == 0 || dim % 2 != 0 {
            return Err(NoiseVecError::InvalidArgument(format!(
                "mean length must be even and positive, got {dim}"
            )));
        }
        if covariance.shape() != (dim, dim) {
            return Err(NoiseVecError::DimensionMismatch {
                expected: dim,
                got: if covariance.nrows() != dim {
                    covariance.nrows()
                } else {
                    covariance.ncols()
                },
            });
        }
        check_scale(scale, "scale")?;

        let d = dim / 2;
        let covariance = symmetrize(covariance);
        let lambda = invert(&covariance, "covariance")?;

        let lambda_ss = lambda.view((0, 0), (d, d)).into_owned();
        let lambda_sn = lambda.view((0, d), (d, d)).into_owned();
        let cov_nn = covariance.view((d, d), (d, d)).into_owned();

        let mu_s = mean.rows(0, d).into_owned();
        let mu_n = mean.rows(d, d).into_owned();

        let lambda_n = invert(&cov_nn, "noise covariance block")?;
        let b = -solve_matrix(&lambda_ss, &lambda_sn, "speech precision block")?;
        let a = &mu_s - &b * &mu_n;

        debug!(dim, scale, "estimated noise prior");
        Ok(Self {
            mu_n,
            a,
            b,
            lambda_n,
            lambda_s: lambda_ss,
            r_s: scale,
            r_n: scale,
        })
    }

    /// Estimates the prior like [`estimate`](Self::estimate) with unit scale,
    /// then sets `r_s`/`r_n` from frame-level statistics:
    ///
    /// `r_s = dim · num_speech / trace(Lambda_s · speech_outer_sum)`
    ///
    /// and the same for noise. A class with no frames keeps scale 1.
    pub fn estimate_with_stats(
        mean: &DVector<f64>,
        covariance: &DMatrix<f64>,
        stats: &SufficientStats,
    ) -> Result<Self> {
        let mut prior = Self::estimate(mean, covariance, 1.0)?;
        if stats.dim() != prior.half_dim() {
            return Err(NoiseVecError::DimensionMismatch {
                expected: prior.half_dim(),
                got: stats.dim(),
            });
        }
        let dim = prior.dim() as f64;
        if let Some(r) = scaling_ratio(
            dim,
            stats.num_speech(),
            &prior.lambda_s,
            stats.speech_outer_sum(),
        ) {
            prior.r_s = r;
        }
        if let Some(r) = scaling_ratio(
            dim,
            stats.num_noise(),
            &prior.lambda_n,
            stats.noise_outer_sum(),
        ) {
            prior.r_n = r;
        }
        Ok(prior)
    }

    /// Builds a prior from its parts, checking that shapes agree and that
    /// both scales are finite and positive.
    pub fn from_parts(
        mu_n: DVector<f64>,
        a: DVector<f64>,
        b: DMatrix<f64>,
        lambda_n: DMatrix<f64>,
        lambda_s: DMatrix<f64>,
        r_s: f64,
        r_n: f64,
    ) -> Result<Self> {
        let d = a.len();
        if d == 0 {
            return Err(NoiseVecError::InvalidArgument("prior dimension is zero".into()));
        }
        if mu_n.len() != d {
            return Err(NoiseVecError::DimensionMismatch {
                expected: d,
                got: mu_n.len(),
            });
        }
        for m in [&b, &lambda_n, &lambda_s] {
            if m.shape() != (d, d) {
                return Err(NoiseVecError::DimensionMismatch {
                    expected: d,
                    got: if m.nrows() != d { m.nrows() } else { m.ncols() },
                });
            }
        }
        check_scale(r_s, "r_s")?;
        check_scale(r_n, "r_n")?;
        Ok(Self {
            mu_n,
            a,
            b,
            lambda_n,
            lambda_s,
            r_s,
            r_n,
        })
    }

    /// Dimension of the combined speech/noise vector (`2d`).
    pub fn dim(&self) -> usize {
        2 * self.a.len()
    }

    /// Dimension of one half (`d`), equal to the feature dimension.
    pub fn half_dim(&self) -> usize {
        self.a.len()
    }

    /// Noise mean.
    pub fn mu_n(&self) -> &DVector<f64> {
        &self.mu_n
    }

    /// Offset of the speech mean given the noise vector.
    pub fn a(&self) -> &DVector<f64> {
        &self.a
    }

    /// Regression of the speech mean on the noise vector.
    pub fn b(&self) -> &DMatrix<f64> {
        &self.b
    }

    /// Noise precision.
    pub fn lambda_n(&self) -> &DMatrix<f64> {
        &self.lambda_n
    }

    /// Speech precision.
    pub fn lambda_s(&self) -> &DMatrix<f64> {
        &self.lambda_s
    }

    pub fn r_s(&self) -> f64 {
        self.r_s
    }

    pub fn r_n(&self) -> f64 {
        self.r_n
    }

    /// The combined vector implied by the prior alone: `(a + B·mu_n, mu_n)`.
    pub fn zero_evidence_vector(&self) -> DVector<f64> {
        let d = self.half_dim();
        let mut v = DVector::zeros(2 * d);
        v.rows_mut(0, d).copy_from(&(&self.a + &self.b * &self.mu_n));
        v.rows_mut(d, d).copy_from(&self.mu_n);
        v
    }

    pub(crate) fn set_scales(&mut self, r_s: f64, r_n: f64) {
        self.r_s = r_s;
        self.r_n = r_n;
    }

    /// Serializes the prior in binary or text form.
    pub fn encode(&self, binary: bool) -> Vec<u8> {
        let mut enc = Encoder::new(binary);
        enc.token(START_MARKER);
        enc.vector(&self.mu_n);
        enc.vector(&self.a);
        enc.matrix(&self.b);
        enc.matrix(&self.lambda_n);
        enc.matrix(&self.lambda_s);
        enc.scalar(self.r_s);
        enc.scalar(self.r_n);
        enc.token(END_MARKER);
        enc.finish().to_vec()
    }

    /// Parses a prior written by [`encode`](Self::encode) in the same mode.
    pub fn decode(data: &[u8], binary: bool) -> Result<Self> {
        let mut dec = Decoder::new(data, binary)?;
        dec.expect_token(START_MARKER)?;
        let mu_n = dec.vector()?;
        let a = dec.vector()?;
        let b = dec.matrix()?;
        let lambda_n = dec.matrix()?;
        let lambda_s = dec.matrix()?;
        let r_s = dec.scalar()?;
        let r_n = dec.scalar()?;
        dec.expect_token(END_MARKER)?;

        let prior = Self::from_parts(mu_n, a, b, lambda_n, lambda_s, r_s, r_n).map_err(|e| {
            NoiseVecError::Format(format!("inconsistent prior: {e}"))
        })?;
        let finite = [&prior.b, &prior.lambda_n, &prior.lambda_s]
            .iter()
            .all(|m| is_finite(m.as_slice()))
            && is_finite(prior.mu_n.as_slice())
            && is_finite(prior.a.as_slice());
        if !finite {
            return Err(NoiseVecError::Format("prior contains non-finite values".into()));
        }
        Ok(prior)
    }

    /// Writes the prior to `w`, without a file header.
    pub fn write<W: Write>(&self, w: &mut W, binary: bool) -> Result<()> {
        w.write_all(&self.encode(binary))?;
        Ok(())
    }

    /// Reads a prior from `r`, without a file header.
    pub fn read<R: Read>(r: &mut R, binary: bool) -> Result<Self> {
        let mut data = Vec::new();
        r.read_to_end(&mut data)?;
        Self::decode(&data, binary)
    }

    /// Writes the prior to a file. Binary files start with a `\0B` header.
    pub fn save(&self, path: impl AsRef<Path>, binary: bool) -> Result<()> {
        let mut data = Vec::new();
        if binary {
            data.extend_from_slice(BINARY_HEADER);
        }
        data.extend_from_slice(&self.encode(binary));
        fs::write(path, data)?;
        Ok(())
    }

    /// Reads a prior file, detecting binary or text mode from the header.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read(path)?;
        match data.strip_prefix(BINARY_HEADER) {
            Some(body) => Self::decode(body, true),
            None => Self::decode(&data, false),
        }
    }
}

/// `scale · count / trace(precision · outer_sum)`, or `None` when there are
/// no frames or the trace is not positive.
pub(crate) fn scaling_ratio(
    scale: f64,
    count: usize,
    precision: &DMatrix<f64>,
    outer_sum: &DMatrix<f64>,
) -> Option<f64> {
    if count == 0 {
        return None;
    }
    let trace = trace_mat_mat(precision, outer_sum);
    if !(trace > 0.0 && trace.is_finite()) {
        return None;
    }
    Some(scale * count as f64 / trace)
}

fn check_scale(value: f64, name: &str) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(NoiseVecError::InvalidArgument(format!(
            "{name} must be finite and positive, got {value}"
        )));
    }
    Ok(())
}
