//! Levenberg–Marquardt optimizer for small weighted least-squares problems.
//!
//! Minimizes
//!
//! ```text
//! χ²(p) = Σ w_i (y_i - f_i(p))²
//! ```
//!
//! over a handful of parameters. Models implement [`LmModel`]; the Jacobian
//! defaults to forward differences so only the VFA fit (where an analytic
//! Jacobian is cheap) overrides it.
//!
//! Convergence is declared when the proposed step is small relative to the
//! parameter vector, `||δ|| < tol·(tol + ||p||)`. Parameters should therefore
//! be of comparable magnitude; callers fit in units of a typical value.
//!
//! On noiseless data χ² sits at rounding level and no step decreases it: the
//! damping grows, the step shrinks, and the relative-step test fires.
//!
//! A small step alone does not prove a minimum. Along a direction the data
//! cannot resolve the optimizer creeps with ever smaller steps, so at the
//! stopping point the Jacobian columns must still be linearly independent:
//! the smallest eigenvalue of their correlation matrix has to exceed the
//! tolerance, otherwise the run ends in a convergence error.

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::error::FitError;

/// Configuration for Levenberg–Marquardt optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct LmConfig {
    /// Maximum number of iterations (accepted + rejected steps).
    pub max_iterations: usize,
    /// Convergence threshold on the relative step `||δ|| / (tol + ||p||)`.
    pub tolerance: f64,
    /// Initial damping parameter.
    pub initial_lambda: f64,
    /// Factor to increase lambda on a failed step.
    pub lambda_up: f64,
    /// Factor to decrease lambda on a successful step.
    pub lambda_down: f64,
    /// Give up once lambda exceeds this value.
    pub max_lambda: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-8,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
            max_lambda: 1e10,
        }
    }
}

/// Result of an LM run.
#[derive(Debug, Clone, PartialEq)]
pub struct LmResult {
    pub params: Vec<f64>,
    /// Weighted sum of squared residuals at `params`.
    pub cost: f64,
    pub iterations: usize,
}

/// A model that can be fit with [`optimize`].
pub trait LmModel {
    /// Number of free parameters.
    fn n_params(&self) -> usize;

    /// Model predictions for every observation.
    fn predict(&self, params: &[f64]) -> Result<Vec<f64>, FitError>;

    /// Jacobian of the predictions, `n_obs × n_params`.
    fn jacobian(&self, params: &[f64]) -> Result<DMatrix<f64>, FitError> {
        finite_difference_jacobian(self, params)
    }

    /// Project parameters back into their feasible region after an update.
    fn constrain(&self, _params: &mut [f64]) {}
}

/// Forward-difference Jacobian.
pub fn finite_difference_jacobian<M: LmModel + ?Sized>(
    model: &M,
    params: &[f64],
) -> Result<DMatrix<f64>, FitError> {
    let base = model.predict(params)?;
    let mut jac = DMatrix::<f64>::zeros(base.len(), params.len());
    let mut shifted = params.to_vec();

    for j in 0..params.len() {
        let h = f64::EPSILON.sqrt() * params[j].abs().max(1.0);
        shifted[j] = params[j] + h;
        let bumped = model.predict(&shifted)?;
        shifted[j] = params[j];
        if bumped.len() != base.len() {
            return Err(FitError::shape("model prediction length changed between evaluations"));
        }
        for i in 0..base.len() {
            jac[(i, j)] = (bumped[i] - base[i]) / h;
        }
    }

    Ok(jac)
}

/// Diagonal floor so that parameters with no influence still get damped.
const DIAG_FLOOR: f64 = 1e-12;

/// Run Levenberg–Marquardt from `initial`.
///
/// `weights` defaults to 1 for every observation. Zero weights exclude points.
pub fn optimize<M: LmModel + ?Sized>(
    model: &M,
    observed: &[f64],
    weights: Option<&[f64]>,
    initial: &[f64],
    config: &LmConfig,
) -> Result<LmResult, FitError> {
    if initial.len() != model.n_params() {
        return Err(FitError::shape(format!(
            "expected {} initial parameters, got {}",
            model.n_params(),
            initial.len()
        )));
    }
    if let Some(w) = weights {
        if w.len() != observed.len() {
            return Err(FitError::shape(format!(
                "weights length {} does not match {} observations",
                w.len(),
                observed.len()
            )));
        }
        if w.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(FitError::domain("weights must be finite and non-negative"));
        }
    }
    if observed.iter().any(|v| !v.is_finite()) {
        return Err(FitError::domain("observations contain non-finite values"));
    }

    let n_obs = observed.len();
    let n_params = initial.len();
    let sqrt_w: Vec<f64> = match weights {
        Some(w) => w.iter().map(|v| v.sqrt()).collect(),
        None => vec![1.0; n_obs],
    };

    let mut params = initial.to_vec();
    model.constrain(&mut params);
    let mut residuals = weighted_residuals(model, observed, &sqrt_w, &params)?;
    let mut cost = residuals.norm_squared();
    let mut lambda = config.initial_lambda;

    for iter in 0..config.max_iterations {
        let iterations = iter + 1;

        let mut jac = model.jacobian(&params)?;
        if jac.nrows() != n_obs || jac.ncols() != n_params {
            return Err(FitError::shape(format!(
                "jacobian is {}x{}, expected {n_obs}x{n_params}",
                jac.nrows(),
                jac.ncols()
            )));
        }
        for (i, &sw) in sqrt_w.iter().enumerate() {
            jac.row_mut(i).scale_mut(sw);
        }

        let jt = jac.transpose();
        let hessian = &jt * &jac;
        let gradient = &jt * &residuals;

        let mut damped = hessian.clone();
        for i in 0..n_params {
            damped[(i, i)] += lambda * hessian[(i, i)].max(DIAG_FLOOR);
        }

        let Some(delta) = damped.lu().solve(&gradient) else {
            return Err(FitError::convergence(iterations, "singular normal equations"));
        };
        if delta.iter().any(|d| !d.is_finite()) {
            return Err(FitError::convergence(iterations, "non-finite parameter step"));
        }

        let params_norm = params.iter().map(|p| p * p).sum::<f64>().sqrt();
        let step_small = delta.norm() < config.tolerance * (config.tolerance + params_norm);

        let mut trial: Vec<f64> = params.iter().zip(delta.iter()).map(|(p, d)| p + d).collect();
        model.constrain(&mut trial);

        // A trial point where the model cannot be evaluated is treated as a
        // rejected step.
        let trial_eval = weighted_residuals(model, observed, &sqrt_w, &trial)
            .ok()
            .map(|r| {
                let c = r.norm_squared();
                (r, c)
            })
            .filter(|(_, c)| c.is_finite());

        match trial_eval {
            Some((trial_residuals, trial_cost)) if trial_cost < cost => {
                params = trial;
                residuals = trial_residuals;
                cost = trial_cost;
                lambda = (lambda * config.lambda_down).max(f64::MIN_POSITIVE);
            }
            _ => {
                lambda *= config.lambda_up;
            }
        }

        debug!("lm iter={iterations} cost={cost:.6e} lambda={lambda:.3e}");

        if step_small {
            let independence = min_correlation_eigenvalue(&hessian);
            if !(independence > config.tolerance) {
                return Err(FitError::convergence(
                    iterations,
                    format!(
                        "parameters are not identifiable at the stopping point \
                         (Jacobian column independence {independence:.1e})"
                    ),
                ));
            }
            return Ok(LmResult {
                params,
                cost,
                iterations,
            });
        }
        if lambda > config.max_lambda {
            return Err(FitError::convergence(
                iterations,
                format!("damping exceeded {:.1e} without meeting tolerance", config.max_lambda),
            ));
        }
    }

    Err(FitError::convergence(
        config.max_iterations,
        format!("tolerance {:.1e} not met", config.tolerance),
    ))
}

/// Smallest eigenvalue of `JᵀJ` scaled to unit diagonal; 0 for a column
/// that has no influence at all.
fn min_correlation_eigenvalue(hessian: &DMatrix<f64>) -> f64 {
    let n = hessian.nrows();
    let diag: Vec<f64> = (0..n).map(|i| hessian[(i, i)]).collect();
    if diag.iter().any(|d| !(d.is_finite() && *d > 0.0)) {
        return 0.0;
    }
    let corr = DMatrix::from_fn(n, n, |i, j| hessian[(i, j)] / (diag[i] * diag[j]).sqrt());
    corr.symmetric_eigen()
        .eigenvalues
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min)
}

fn weighted_residuals<M: LmModel + ?Sized>(
    model: &M,
    observed: &[f64],
    sqrt_w: &[f64],
    params: &[f64],
) -> Result<DVector<f64>, FitError> {
    let predicted = model.predict(params)?;
    if predicted.len() != observed.len() {
        return Err(FitError::shape(format!(
            "model returned {} predictions for {} observations",
            predicted.len(),
            observed.len()
        )));
    }
    Ok(DVector::from_iterator(
        observed.len(),
        observed
            .iter()
            .zip(predicted.iter())
            .zip(sqrt_w.iter())
            .map(|((y, f), sw)| sw * (y - f)),
    ))
}
