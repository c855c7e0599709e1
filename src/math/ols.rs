//! Ordinary least squares helpers.
//!
//! The VFA linear estimator and the Levenberg–Marquardt normal equations both
//! reduce to small dense least-squares problems:
//!
//! ```text
//! minimize ||X β - y||²
//! ```
//!
//! We solve them with SVD so that tall design matrices (more rows than
//! columns) work; nalgebra's `QR::solve` only handles square systems.

use nalgebra::{DMatrix, DVector};

use crate::error::FitError;

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Straight line `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub slope: f64,
    pub intercept: f64,
}

/// Relative spread of `x` below which a line fit is considered degenerate.
const MIN_RELATIVE_SPREAD: f64 = 1e-12;

/// Fit a straight line through `(x_i, y_i)` by ordinary least squares.
pub fn fit_line(x: &[f64], y: &[f64]) -> Result<Line, FitError> {
    if x.len() != y.len() {
        return Err(FitError::shape(format!(
            "line fit needs matching lengths (x={}, y={})",
            x.len(),
            y.len()
        )));
    }
    if x.len() < 2 {
        return Err(FitError::shape(format!(
            "line fit needs at least 2 points, got {}",
            x.len()
        )));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(FitError::domain("line fit input contains non-finite values"));
    }

    // The SVD solve happily returns a minimum-norm answer for a rank-deficient
    // design, so a vertical point cloud has to be rejected up front.
    let n = x.len() as f64;
    let mean = x.iter().sum::<f64>() / n;
    let spread = x.iter().map(|v| (v - mean).abs()).fold(0.0_f64, f64::max);
    let scale = x.iter().map(|v| v.abs()).fold(0.0_f64, f64::max).max(f64::MIN_POSITIVE);
    if spread <= MIN_RELATIVE_SPREAD * scale {
        return Err(FitError::domain("line fit is degenerate: all x values are equal"));
    }

    let design = DMatrix::from_fn(x.len(), 2, |i, j| if j == 0 { x[i] } else { 1.0 });
    let obs = DVector::from_column_slice(y);
    let beta = solve_least_squares(&design, &obs)
        .ok_or_else(|| FitError::domain("line fit least-squares system is singular"))?;

    Ok(Line {
        slope: beta[0],
        intercept: beta[1],
    })
}
