//! Scalar root finding.
//!
//! Used to invert forward models point by point (enhancement → concentration).
//! The solver is Newton's method with a forward-difference derivative. Once a
//! sign change has been seen, iterates are kept inside the bracket and a
//! Newton step that leaves it is replaced by bisection.

use crate::error::FitError;

/// Root finder settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RootConfig {
    /// Converged when consecutive iterates differ by at most `xtol·(xtol + |x|)`.
    pub xtol: f64,
    /// Maximum number of function evaluations.
    pub max_evaluations: usize,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            xtol: 1e-7,
            max_evaluations: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bracket {
    lo: f64,
    f_lo: f64,
    hi: f64,
}

impl Bracket {
    fn contains(&self, x: f64) -> bool {
        let (a, b) = if self.lo < self.hi { (self.lo, self.hi) } else { (self.hi, self.lo) };
        x > a && x < b
    }

    fn midpoint(&self) -> f64 {
        0.5 * (self.lo + self.hi)
    }

    fn shrink(&mut self, x: f64, fx: f64) {
        if fx.signum() == self.f_lo.signum() {
            self.lo = x;
            self.f_lo = fx;
        } else {
            self.hi = x;
        }
    }
}

/// Find `x` with `f(x) = 0`, starting from `x0`.
pub fn find_root<F>(mut f: F, x0: f64, config: &RootConfig) -> Result<f64, FitError>
where
    F: FnMut(f64) -> Result<f64, FitError>,
{
    if !x0.is_finite() {
        return Err(FitError::domain("root finder start point is not finite"));
    }

    let mut evaluations = 0usize;
    let mut eval = |x: f64, evaluations: &mut usize| -> Result<f64, FitError> {
        *evaluations += 1;
        let fx = f(x)?;
        if fx.is_finite() {
            Ok(fx)
        } else {
            Err(FitError::domain(format!("objective is not finite at x={x}")))
        }
    };

    let mut x = x0;
    let mut fx = eval(x, &mut evaluations)?;
    let mut bracket: Option<Bracket> = None;

    while fx != 0.0 {
        if evaluations + 2 > config.max_evaluations {
            return Err(FitError::convergence(
                evaluations,
                format!("no root within {} evaluations", config.max_evaluations),
            ));
        }

        let h = 1e-6 * x.abs().max(1.0);
        let slope = (eval(x + h, &mut evaluations)? - fx) / h;
        let newton = if slope != 0.0 && slope.is_finite() {
            Some(x - fx / slope)
        } else {
            None
        };

        let next = match (newton, bracket) {
            (Some(n), Some(b)) if b.contains(n) => n,
            (_, Some(b)) => b.midpoint(),
            (Some(n), None) if n.is_finite() => n,
            _ => {
                return Err(FitError::domain(format!(
                    "flat objective at x={x}, cannot take a Newton step"
                )));
            }
        };

        let f_next = eval(next, &mut evaluations)?;

        match bracket.as_mut() {
            Some(b) => b.shrink(next, f_next),
            None if f_next.signum() != fx.signum() => {
                bracket = Some(Bracket {
                    lo: x,
                    f_lo: fx,
                    hi: next,
                });
            }
            None => {}
        }

        let converged = (next - x).abs() <= config.xtol * (config.xtol + next.abs())
            || bracket
                .map(|b| (b.hi - b.lo).abs() <= config.xtol * (config.xtol + next.abs()))
                .unwrap_or(false);

        x = next;
        fx = f_next;
        if converged {
            break;
        }
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_square_root() {
        let root = find_root(|x| Ok(x * x - 2.0), 1.0, &RootConfig::default()).unwrap();
        assert!((root - 2f64.sqrt()).abs() < 1e-7);
    }

    #[test]
    fn returns_start_when_already_a_root() {
        let root = find_root(|x| Ok(3.0 * x), 0.0, &RootConfig::default()).unwrap();
        assert_eq!(root, 0.0);
    }

    #[test]
    fn bisects_when_newton_overshoots() {
        // atan has a tiny slope far from 0 so raw Newton diverges from x0=3.
        let root = find_root(|x: f64| Ok(x.atan()), 3.0, &RootConfig::default()).unwrap();
        assert!(root.abs() < 1e-6, "root={root}");
    }

    #[test]
    fn evaluation_budget_is_enforced() {
        let config = RootConfig {
            xtol: 1e-7,
            max_evaluations: 3,
        };
        let err = find_root(|x| Ok(x * x + 1.0), 5.0, &config).unwrap_err();
        assert!(matches!(err, FitError::Convergence { .. }));
    }
}
