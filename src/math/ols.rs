//! Linear solvers.
//!
//! Two kinds of small linear problems show up while fitting decays:
//!
//! ```text
//! minimize Σ w_i (y_i - x_i^T β)^2          (amplitudes for fixed lifetimes)
//! (JᵀWJ + λ·diag(JᵀWJ)) δ = JᵀW r            (Levenberg–Marquardt step)
//! ```
//!
//! Implementation choices:
//! - Weighted least squares scales rows by `sqrt(w_i)` and solves the tall
//!   system with SVD, which stays robust when lifetimes are nearly equal and
//!   the exponential columns become collinear.
//! - The damped normal equations are symmetric positive definite whenever
//!   `λ > 0` and the Jacobian has no zero column, so Cholesky is tried first;
//!   SVD is the fallback for the rank-deficient case.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve a weighted least squares problem `min Σ w_i (y_i - x_i^T β)^2`.
pub fn solve_weighted_least_squares(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    w: &[f64],
) -> Option<DVector<f64>> {
    if w.len() != y.len() || x.nrows() != y.len() {
        return None;
    }
    let mut xw = x.clone();
    let mut yw = y.clone();
    for (i, &wi) in w.iter().enumerate() {
        let sw = wi.max(0.0).sqrt();
        xw.row_mut(i).scale_mut(sw);
        yw[i] *= sw;
    }
    solve_least_squares(&xw, &yw)
}

/// Solve a small symmetric system, Cholesky first, SVD as fallback.
pub fn solve_symmetric(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    if let Some(chol) = a.clone().cholesky() {
        let x = chol.solve(b);
        if x.iter().all(|v| v.is_finite()) {
            return Some(x);
        }
    }
    solve_least_squares(a, b)
}
