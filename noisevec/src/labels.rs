//! Per-frame speech/silence decisions from three-way frame targets.
//!
//! Targets have one row per frame and (at least) three score columns:
//! column 0 for silence, 1 for speech, 2 for garbage/other noise. A frame
//! counts as speech only when the speech score beats both others:
//!
//! ```text
//! silence(i) = t[i,0] > t[i,1] || t[i,2] > t[i,1]
//! ```
//!
//! Ties go to speech. Every tool in this workspace uses this one rule.

use nalgebra::DMatrix;

use crate::error::{NoiseVecError, Result};

/// Minimum number of target columns.
pub const NUM_TARGET_COLUMNS: usize = 3;

const SILENCE: usize = 0;
const SPEECH: usize = 1;
const GARBAGE: usize = 2;

/// Decides whether one frame is silence given its target scores.
pub fn is_silence(scores: &[f64]) -> bool {
    debug_assert!(scores.len() >= NUM_TARGET_COLUMNS);
    scores[SILENCE] > scores[SPEECH] || scores[GARBAGE] > scores[SPEECH]
}

/// Computes silence decisions for every row of `targets`.
///
/// Fails if `targets` has fewer than three columns or if `num_frames` is
/// given and differs from the number of target rows.
pub fn silence_decisions(targets: &DMatrix<f64>, num_frames: Option<usize>) -> Result<Vec<bool>> {
    if targets.ncols() < NUM_TARGET_COLUMNS {
        return Err(NoiseVecError::DimensionMismatch {
            expected: NUM_TARGET_COLUMNS,
            got: targets.ncols(),
        });
    }
    if let Some(frames) = num_frames {
        if frames != targets.nrows() {
            return Err(NoiseVecError::DimensionMismatch {
                expected: frames,
                got: targets.nrows(),
            });
        }
    }
    Ok(targets
        .row_iter()
        .map(|row| {
            let scores = [row[SILENCE], row[SPEECH], row[GARBAGE]];
            is_silence(&scores)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speech_only_when_strict_max() {
        assert!(!is_silence(&[0.1, 0.8, 0.1]));
        assert!(is_silence(&[0.8, 0.1, 0.1]));
        assert!(is_silence(&[0.1, 0.1, 0.8]));
    }

    #[test]
    fn ties_count_as_speech() {
        assert!(!is_silence(&[0.5, 0.5, 0.0]));
        assert!(!is_silence(&[0.0, 0.5, 0.5]));
        assert!(!is_silence(&[1.0, 1.0, 1.0]));
    }

    #[test]
    fn decisions_per_row() {
        let targets = DMatrix::from_row_slice(
            3,
            3,
            &[
                0.9, 0.1, 0.0, //
                0.0, 1.0, 0.0, //
                0.2, 0.3, 0.5,
            ],
        );
        assert_eq!(
            silence_decisions(&targets, Some(3)).unwrap(),
            vec![true, false, true]
        );
    }

    #[test]
    fn decisions_check_shape() {
        let narrow = DMatrix::zeros(4, 2);
        assert!(matches!(
            silence_decisions(&narrow, None),
            Err(NoiseVecError::DimensionMismatch { expected: 3, got: 2 })
        ));
        let targets = DMatrix::zeros(4, 3);
        assert!(matches!(
            silence_decisions(&targets, Some(5)),
            Err(NoiseVecError::DimensionMismatch { expected: 5, got: 4 })
        ));
    }
}
