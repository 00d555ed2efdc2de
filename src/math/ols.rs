//! Small dense least squares helpers.
//!
//! Two problems show up repeatedly in the fitter:
//!
//! ```text
//! minimize ‖X β - y‖²                  (damped LM step, log-linear seed)
//! (JᵀJ)⁺                               (parameter covariance)
//! ```
//!
//! Implementation choices:
//! - SVD solves both robustly for tall matrices. Nalgebra's `QR::solve` is
//!   intended for square systems and panics on non-square input.
//! - Parameter dimension is tiny (2–3 columns), so SVD cost is negligible even
//!   for week-long windows at one-minute resolution.

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

/// Moore–Penrose pseudo-inverse of a square normal matrix.
///
/// Singular directions (relative singular value below `rcond`) are dropped,
/// matching how an unidentifiable parameter gets no finite variance.
pub fn pseudo_inverse(m: &DMatrix<f64>, rcond: f64) -> Option<DMatrix<f64>> {
    let svd = m.clone().svd(true, true);
    let smax = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    if !(smax.is_finite() && smax > 0.0) {
        return None;
    }
    svd.pseudo_inverse(rcond * smax).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn pseudo_inverse_of_diagonal() {
        let m = DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 0.0, 0.5]);
        let inv = pseudo_inverse(&m, 1e-12).unwrap();
        assert!((inv[(0, 0)] - 0.25).abs() < 1e-12);
        assert!((inv[(1, 1)] - 2.0).abs() < 1e-12);
    }
}
