//! Online Bayesian estimation of speech/noise vectors for noise-robust ASR.
//!
//! # Architecture
//!
//! Each utterance is summarized by a combined vector `(s, n)` of length
//! `2d`: an estimate of the mean speech feature vector and of the mean
//! noise feature vector, where `d` is the feature dimension.
//!
//! 1. [`NoisePrior::estimate`]: training vectors -> conjugate-Gaussian prior
//!    over `(s, n)`, persisted with [`NoisePrior::save`].
//! 2. [`OnlineEstimator::extract_vectors`]: features plus per-frame
//!    silence decisions -> one MAP estimate of `(s, n)` every `period`
//!    frames, adapting its evidence weights `r_s`/`r_n` as frames arrive.
//!
//! ```text
//! T×d features ──┐
//!                ├─> SufficientStats ─> solve K x = Q ─> ⌈T/period⌉ × 2d
//! T×3 targets ───┘        (labels::silence_decisions)
//! ```
//!
//! # Priors
//!
//! The noise half is `N(mu_n, Lambda_n⁻¹)`; the speech half given the noise
//! is `N(a + B·n, Lambda_s⁻¹)`. Without labels the estimator falls back to
//! [`NoisePrior::zero_evidence_vector`].
//!
//! The [`baseline`] module provides prior-free class averages.

pub mod baseline;
mod codec;
mod error;
mod estimator;
pub mod labels;
mod linalg;
mod prior;
mod stats;
mod training;

pub use error::{NoiseVecError, Result};
pub use estimator::{num_chunks, OnlineEstimator};
pub use labels::{is_silence, silence_decisions, NUM_TARGET_COLUMNS};
pub use linalg::trace_mat_mat;
pub use prior::NoisePrior;
pub use stats::SufficientStats;
pub use training::NoiseVectorSet;
