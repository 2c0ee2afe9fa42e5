//! Prior-free noise vectors.
//!
//! Simple class averages of the feature frames, for comparison against the
//! online estimator and for collecting training vectors.

use nalgebra::{DMatrix, DVector};

use crate::error::{NoiseVecError, Result};
use crate::estimator::num_chunks;
use crate::stats::SufficientStats;

/// Default number of frames averaged at each edge by [`edge_vector`].
pub const DEFAULT_EDGE_FRAMES: usize = 10;

/// Mean of speech frames followed by mean of silence frames (`2d`).
///
/// A class with no frames contributes zeros. Without labels the whole
/// vector is zero.
pub fn segment_vector(features: &DMatrix<f64>, silence: Option<&[bool]>) -> Result<DVector<f64>> {
    let d = features.ncols();
    let Some(silence) = silence else {
        return Ok(DVector::zeros(2 * d));
    };
    check_labels(features, silence)?;

    let mut stats = SufficientStats::new(d);
    for (i, &is_silence) in silence.iter().enumerate() {
        stats.update(&features.row(i).transpose(), is_silence)?;
    }
    Ok(class_means(&stats))
}

/// Mean of the first `n` and last `n` frames (`d`).
///
/// Frames are counted once even when the two edges overlap, so an
/// utterance shorter than `2n` frames averages all its frames.
pub fn edge_vector(features: &DMatrix<f64>, n: usize) -> Result<DVector<f64>> {
    if n == 0 {
        return Err(NoiseVecError::InvalidArgument(
            "edge frame count must be positive".into(),
        ));
    }
    let frames = features.nrows();
    if frames == 0 {
        return Err(NoiseVecError::InsufficientData("no frames".into()));
    }

    let head = n.min(frames);
    let tail_start = frames.saturating_sub(n).max(head);
    let mut sum = DVector::zeros(features.ncols());
    let mut count = 0usize;
    for i in (0..head).chain(tail_start..frames) {
        sum += features.row(i).transpose();
        count += 1;
    }
    Ok(sum / count as f64)
}

/// Running class means, one row per chunk of `period` frames.
///
/// Row `k` holds the speech and silence means over all frames up to the
/// end of chunk `k`. Output is `⌈T/period⌉ × 2d`; all zeros without labels.
pub fn running_mean_vectors(
    features: &DMatrix<f64>,
    silence: Option<&[bool]>,
    period: usize,
) -> Result<DMatrix<f64>> {
    if period == 0 {
        return Err(NoiseVecError::InvalidArgument(
            "period must be positive".into(),
        ));
    }
    let frames = features.nrows();
    let d = features.ncols();
    let rows = num_chunks(frames, period);
    let mut vectors = DMatrix::zeros(rows, 2 * d);
    let Some(silence) = silence else {
        return Ok(vectors);
    };
    check_labels(features, silence)?;

    let mut stats = SufficientStats::new(d);
    for chunk in 0..rows {
        let start = chunk * period;
        let end = (start + period).min(frames);
        for i in start..end {
            stats.update(&features.row(i).transpose(), silence[i])?;
        }
        vectors.set_row(chunk, &class_means(&stats).transpose());
    }
    Ok(vectors)
}

fn check_labels(features: &DMatrix<f64>, silence: &[bool]) -> Result<()> {
    if silence.len() != features.nrows() {
        return Err(NoiseVecError::DimensionMismatch {
            expected: features.nrows(),
            got: silence.len(),
        });
    }
    Ok(())
}

fn class_means(stats: &SufficientStats) -> DVector<f64> {
    let d = stats.dim();
    let mut v = DVector::zeros(2 * d);
    if stats.num_speech() > 0 {
        v.rows_mut(0, d)
            .copy_from(&(stats.speech_sum() / stats.num_speech() as f64));
    }
    if stats.num_noise() > 0 {
        v.rows_mut(d, d)
            .copy_from(&(stats.noise_sum() / stats.num_noise() as f64));
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            4,
            2,
            &[
                1.0, 2.0, //
                3.0, 4.0, //
                5.0, 6.0, //
                7.0, 8.0,
            ],
        )
    }

    #[test]
    fn segment_vector_class_means() {
        let v = segment_vector(&features(), Some(&[false, true, false, true])).unwrap();
        assert_eq!(v.as_slice(), &[3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn segment_vector_missing_class_is_zero() {
        let v = segment_vector(&features(), Some(&[false; 4])).unwrap();
        assert_eq!(v.as_slice(), &[4.0, 5.0, 0.0, 0.0]);
    }

    #[test]
    fn segment_vector_without_labels() {
        let v = segment_vector(&features(), None).unwrap();
        assert_eq!(v.len(), 4);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn segment_vector_label_mismatch() {
        assert!(matches!(
            segment_vector(&features(), Some(&[true, false])),
            Err(NoiseVecError::DimensionMismatch { expected: 4, got: 2 })
        ));
    }

    #[test]
    fn edge_vector_means() {
        // First and last frame.
        let v = edge_vector(&features(), 1).unwrap();
        assert_eq!(v.as_slice(), &[4.0, 5.0]);
        // Overlapping edges average every frame once.
        let v = edge_vector(&features(), DEFAULT_EDGE_FRAMES).unwrap();
        assert_eq!(v.as_slice(), &[4.0, 5.0]);
        let v = edge_vector(&features(), 3).unwrap();
        assert_eq!(v.as_slice(), &[4.0, 5.0]);
    }

    #[test]
    fn edge_vector_rejects_empty() {
        assert!(edge_vector(&DMatrix::zeros(0, 2), 10).is_err());
        assert!(edge_vector(&features(), 0).is_err());
    }

    #[test]
    fn running_means_are_cumulative() {
        let labels = [false, true, false, true];
        let out = running_mean_vectors(&features(), Some(&labels), 3).unwrap();
        assert_eq!(out.shape(), (2, 4));
        // Frames 0..3: speech {0, 2}, silence {1}.
        assert_eq!(out.row(0).iter().copied().collect::<Vec<_>>(), vec![3.0, 4.0, 3.0, 4.0]);
        // All frames.
        assert_eq!(out.row(1).iter().copied().collect::<Vec<_>>(), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn running_means_without_labels() {
        let out = running_mean_vectors(&features(), None, 3).unwrap();
        assert_eq!(out, DMatrix::zeros(2, 4));
        assert!(running_mean_vectors(&features(), None, 0).is_err());
    }
}
