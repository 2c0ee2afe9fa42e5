//! Thin wrappers over nalgebra that turn singular results into
//! [`NoiseVecError::Numerical`] instead of `None` or silent infinities.

use nalgebra::{DMatrix, DVector};

use crate::error::{NoiseVecError, Result};

/// Inverts a square matrix. `what` names the matrix in the error message.
pub(crate) fn invert(m: &DMatrix<f64>, what: &str) -> Result<DMatrix<f64>> {
    let inv = m
        .clone()
        .try_inverse()
        .ok_or_else(|| NoiseVecError::Numerical(format!("{what} is singular")))?;
    if !is_finite(inv.as_slice()) {
        return Err(NoiseVecError::Numerical(format!(
            "{what} is too ill-conditioned to invert"
        )));
    }
    Ok(inv)
}

/// Solves `A X = B` for `X` with an LU decomposition of `a`.
pub(crate) fn solve_matrix(a: &DMatrix<f64>, b: &DMatrix<f64>, what: &str) -> Result<DMatrix<f64>> {
    let x = a
        .clone()
        .lu()
        .solve(b)
        .ok_or_else(|| NoiseVecError::Numerical(format!("{what} is singular")))?;
    if !is_finite(x.as_slice()) {
        return Err(NoiseVecError::Numerical(format!(
            "{what} is too ill-conditioned to solve against"
        )));
    }
    Ok(x)
}

/// Relative tolerance for [`is_symmetric`].
const SYMMETRY_TOLERANCE: f64 = 1e-10;

/// Solves `K x = q`.
///
/// Cholesky only reads the lower triangle, so it is used only when `K` is
/// symmetric and positive definite. Anything else goes through LU.
pub(crate) fn solve_system(k: DMatrix<f64>, q: &DVector<f64>) -> Result<DVector<f64>> {
    let chol = if is_symmetric(&k, SYMMETRY_TOLERANCE) {
        k.clone().cholesky()
    } else {
        None
    };
    let x = match chol {
        Some(chol) => chol.solve(q),
        None => k
            .lu()
            .solve(q)
            .ok_or_else(|| NoiseVecError::Numerical("system matrix K is singular".into()))?,
    };
    if !is_finite(x.as_slice()) {
        return Err(NoiseVecError::Numerical(
            "system matrix K is too ill-conditioned to solve against".into(),
        ));
    }
    Ok(x)
}

/// Returns `trace(A * B)` without forming the product.
pub fn trace_mat_mat(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    debug_assert_eq!(a.ncols(), b.nrows());
    debug_assert_eq!(a.nrows(), b.ncols());
    a.component_mul(&b.transpose()).sum()
}

/// Whether `m` is square and `|m_ij - m_ji| <= tol · max|m|` everywhere.
pub(crate) fn is_symmetric(m: &DMatrix<f64>, tol: f64) -> bool {
    if !m.is_square() {
        return false;
    }
    let bound = tol * m.amax();
    let n = m.nrows();
    (0..n).all(|i| (i + 1..n).all(|j| (m[(i, j)] - m[(j, i)]).abs() <= bound))
}

/// Returns `(M + Mᵗ) / 2`.
pub(crate) fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    (m + m.transpose()) * 0.5
}

pub(crate) fn is_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}
