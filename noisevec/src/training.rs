use std::collections::HashSet;

use nalgebra::{DMatrix, DVector};
use tracing::{error, info};

use crate::error::{NoiseVecError, Result};
use crate::prior::NoisePrior;

/// Per-utterance combined vectors gathered from training data.
///
/// Keys are unique: the first vector for a key is kept and later
/// duplicates are logged and skipped. All vectors share one dimension.
#[derive(Debug, Default)]
pub struct NoiseVectorSet {
    keys: HashSet<String>,
    vectors: Vec<DVector<f64>>,
    num_duplicates: usize,
}

impl NoiseVectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the vector for `key`.
    ///
    /// Returns `Ok(false)` if the key was already present; the existing
    /// vector is kept. Fails if the dimension differs from earlier vectors.
    pub fn insert(&mut self, key: impl Into<String>, vector: DVector<f64>) -> Result<bool> {
        let key = key.into();
        if vector.is_empty() {
            return Err(NoiseVecError::InvalidArgument(format!(
                "empty vector for utterance {key}"
            )));
        }
        if let Some(dim) = self.dim() {
            if vector.len() != dim {
                return Err(NoiseVecError::DimensionMismatch {
                    expected: dim,
                    got: vector.len(),
                });
            }
        }
        if self.keys.contains(&key) {
            error!(utterance = %key, "duplicate noise vector, ignoring it");
            self.num_duplicates += 1;
            return Ok(false);
        }
        self.keys.insert(key);
        self.vectors.push(vector);
        Ok(true)
    }

    /// Number of distinct vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Vector dimension, once the first vector has been inserted.
    pub fn dim(&self) -> Option<usize> {
        self.vectors.first().map(|v| v.len())
    }

    /// Number of rejected duplicate keys.
    pub fn num_duplicates(&self) -> usize {
        self.num_duplicates
    }

    /// Sample mean of the vectors.
    pub fn mean(&self) -> Result<DVector<f64>> {
        let dim = self
            .dim()
            .ok_or_else(|| NoiseVecError::InsufficientData("no noise vectors".into()))?;
        let mut mean = DVector::zeros(dim);
        for v in &self.vectors {
            mean += v;
        }
        Ok(mean / self.len() as f64)
    }

    /// Unbiased sample covariance (`N - 1` denominator).
    pub fn covariance(&self) -> Result<DMatrix<f64>> {
        if self.len() < 2 {
            return Err(NoiseVecError::InsufficientData(format!(
                "need at least 2 noise vectors for a covariance, got {}",
                self.len()
            )));
        }
        let mean = self.mean()?;
        let dim = mean.len();
        let mut covariance = DMatrix::zeros(dim, dim);
        let scale = 1.0 / (self.len() - 1) as f64;
        for v in &self.vectors {
            let centered = v - &mean;
            covariance.ger(scale, &centered, &centered, 1.0);
        }
        Ok(covariance)
    }

    /// Estimates a [`NoisePrior`] from the mean and covariance of the set.
    pub fn estimate_prior(&self, scale: f64) -> Result<NoisePrior> {
        let mean = self.mean()?;
        info!(norm = mean.norm(), "2-norm of noise vector mean");
        let covariance = self.covariance()?;
        NoisePrior::estimate(&mean, &covariance, scale)
    }
}
