//! Cumulative integration of sampled time courses.

use crate::error::FitError;

/// Running trapezoidal integral of `y(t)`, starting at 0 for the first sample.
///
/// `t` must be strictly increasing.
pub fn cumulative_trapezoid(t: &[f64], y: &[f64]) -> Result<Vec<f64>, FitError> {
    if t.len() != y.len() {
        return Err(FitError::shape(format!(
            "time axis has {} samples but series has {}",
            t.len(),
            y.len()
        )));
    }
    if t.windows(2).any(|w| !(w[1] > w[0])) {
        return Err(FitError::domain("time axis must be strictly increasing"));
    }

    let mut out = Vec::with_capacity(t.len());
    let mut acc = 0.0;
    for i in 0..t.len() {
        if i > 0 {
            acc += 0.5 * (y[i] + y[i - 1]) * (t[i] - t[i - 1]);
        }
        out.push(acc);
    }
    Ok(out)
}

/// Piecewise-linear interpolation of `(xs, ys)` at `x`; zero outside `[xs[0], xs[n-1]]`.
///
/// `xs` must be sorted ascending and non-empty (checked by callers).
pub fn interp_linear_or_zero(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let (Some(&first), Some(&last)) = (xs.first(), xs.last()) else {
        return 0.0;
    };
    if x < first || x > last {
        return 0.0;
    }
    // First index with xs[idx] >= x.
    let idx = xs.partition_point(|&v| v < x);
    if idx == 0 {
        return ys[0];
    }
    let (x0, x1) = (xs[idx - 1], xs[idx]);
    let (y0, y1) = (ys[idx - 1], ys[idx]);
    if x1 == x0 {
        return y1;
    }
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trapezoid_of_linear_ramp() {
        let t = [0.0, 1.0, 2.0, 4.0];
        let y = [0.0, 1.0, 2.0, 4.0];
        let c = cumulative_trapezoid(&t, &y).unwrap();
        let expected = [0.0, 0.5, 2.0, 8.0];
        for (a, b) in c.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn trapezoid_rejects_unsorted_time() {
        let err = cumulative_trapezoid(&[0.0, 2.0, 1.0], &[1.0, 1.0, 1.0]).unwrap_err();
        assert!(matches!(err, FitError::Domain(_)));
    }

    #[test]
    fn interpolation_inside_and_outside_range() {
        let xs = [0.0, 10.0, 20.0];
        let ys = [0.0, 5.0, 1.0];
        assert!((interp_linear_or_zero(&xs, &ys, 5.0) - 2.5).abs() < 1e-12);
        assert!((interp_linear_or_zero(&xs, &ys, 15.0) - 3.0).abs() < 1e-12);
        assert_eq!(interp_linear_or_zero(&xs, &ys, 20.0), 1.0);
        assert_eq!(interp_linear_or_zero(&xs, &ys, -1.0), 0.0);
        assert_eq!(interp_linear_or_zero(&xs, &ys, 25.0), 0.0);
    }
}
