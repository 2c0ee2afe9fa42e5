use nalgebra::{DMatrix, DVector};

use crate::error::{NoiseVecError, Result};

/// Running sufficient statistics for speech and noise frames.
///
/// Holds, per class, the frame count, the sum of frames and the sum of
/// outer products (unnormalized second moment). Statistics only grow:
/// there is no removal or decay, so they describe everything the owner
/// has seen since construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SufficientStats {
    num_speech: usize,
    num_noise: usize,
    speech_sum: DVector<f64>,
    noise_sum: DVector<f64>,
    speech_outer_sum: DMatrix<f64>,
    noise_outer_sum: DMatrix<f64>,
}

impl SufficientStats {
    /// Creates zeroed statistics for frames of dimension `dim`.
    pub fn new(dim: usize) -> Self {
        Self {
            num_speech: 0,
            num_noise: 0,
            speech_sum: DVector::zeros(dim),
            noise_sum: DVector::zeros(dim),
            speech_outer_sum: DMatrix::zeros(dim, dim),
            noise_outer_sum: DMatrix::zeros(dim, dim),
        }
    }

    /// Adds one frame to the speech or noise statistics.
    pub fn update(&mut self, frame: &DVector<f64>, is_silence: bool) -> Result<()> {
        if frame.len() != self.dim() {
            return Err(NoiseVecError::DimensionMismatch {
                expected: self.dim(),
                got: frame.len(),
            });
        }
        let (count, sum, outer) = if is_silence {
            (&mut self.num_noise, &mut self.noise_sum, &mut self.noise_outer_sum)
        } else {
            (&mut self.num_speech, &mut self.speech_sum, &mut self.speech_outer_sum)
        };
        *count += 1;
        *sum += frame;
        outer.ger(1.0, frame, frame, 1.0);
        Ok(())
    }

    /// Frame dimension.
    pub fn dim(&self) -> usize {
        self.speech_sum.len()
    }

    pub fn num_speech(&self) -> usize {
        self.num_speech
    }

    pub fn num_noise(&self) -> usize {
        self.num_noise
    }

    /// Total number of frames accumulated.
    pub fn total(&self) -> usize {
        self.num_speech + self.num_noise
    }

    pub fn speech_sum(&self) -> &DVector<f64> {
        &self.speech_sum
    }

    pub fn noise_sum(&self) -> &DVector<f64> {
        &self.noise_sum
    }

    /// Sum of `x xᵗ` over speech frames.
    pub fn speech_outer_sum(&self) -> &DMatrix<f64> {
        &self.speech_outer_sum
    }

    /// Sum of `x xᵗ` over noise frames.
    pub fn noise_outer_sum(&self) -> &DMatrix<f64> {
        &self.noise_outer_sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_zeroed() {
        let stats = SufficientStats::new(3);
        assert_eq!(stats.dim(), 3);
        assert_eq!(stats.total(), 0);
        assert_eq!(stats.speech_sum().norm(), 0.0);
        assert_eq!(stats.noise_outer_sum().shape(), (3, 3));
    }

    #[test]
    fn update_routes_by_label() {
        let mut stats = SufficientStats::new(2);
        stats.update(&DVector::from_vec(vec![1.0, 2.0]), false).unwrap();
        stats.update(&DVector::from_vec(vec![3.0, -1.0]), true).unwrap();
        stats.update(&DVector::from_vec(vec![0.5, 0.5]), true).unwrap();

        assert_eq!(stats.num_speech(), 1);
        assert_eq!(stats.num_noise(), 2);
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.speech_sum().as_slice(), &[1.0, 2.0]);
        assert_eq!(stats.noise_sum().as_slice(), &[3.5, -0.5]);

        // Outer products: [3,-1][3,-1]ᵗ + [.5,.5][.5,.5]ᵗ
        let outer = stats.noise_outer_sum();
        assert_eq!(outer[(0, 0)], 9.25);
        assert_eq!(outer[(0, 1)], -2.75);
        assert_eq!(outer[(1, 0)], -2.75);
        assert_eq!(outer[(1, 1)], 1.25);

        let speech = stats.speech_outer_sum();
        assert_eq!(speech[(0, 1)], 2.0);
        assert_eq!(speech[(1, 1)], 4.0);
    }

    #[test]
    fn update_rejects_wrong_dimension() {
        let mut stats = SufficientStats::new(2);
        let err = stats
            .update(&DVector::from_vec(vec![1.0, 2.0, 3.0]), false)
            .unwrap_err();
        assert!(matches!(
            err,
            NoiseVecError::DimensionMismatch { expected: 2, got: 3 }
        ));
        assert_eq!(stats.total(), 0);
    }
}
