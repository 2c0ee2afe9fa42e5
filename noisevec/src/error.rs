use thiserror::Error;

/// Result type alias for noisevec operations.
pub type Result<T> = std::result::Result<T, NoiseVecError>;

/// Errors returned by noisevec operations.
#[derive(Debug, Error)]
pub enum NoiseVecError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A matrix that must be inverted or solved against is singular.
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Malformed or incompatible persisted data.
    #[error("format error: {0}")]
    Format(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl NoiseVecError {
    /// Reports whether the error comes from a singular or ill-conditioned
    /// matrix rather than from bad input shape or format.
    pub fn is_numerical(&self) -> bool {
        matches!(self, Self::Numerical(_))
    }
}
