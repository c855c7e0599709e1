//! Relaxation → signal models.
//!
//! The spoiled gradient echo (SPGR) steady-state signal is
//!
//! ```text
//! S = S0 · sin(α) · (1 - E1) / (1 - cos(α) · E1) · exp(-TE · R2*),   E1 = exp(-TR · R1)
//! ```
//!
//! VFA T1 fitting uses the `TE = 0`, `R1 = 1/T1` special case ([`spgr_signal`]).
//! DCE conversions use the relaxation-rate form on [`SignalModel`], which also
//! takes a B1 correction factor `k` scaling the nominal flip angle.

use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// SPGR signal for equilibrium signal `s0`, `t1`, `flip_angle` (rad) and `tr`.
///
/// No domain checks; see [`spgr_signal_checked`].
pub fn spgr_signal(s0: f64, t1: f64, flip_angle: f64, tr: f64) -> f64 {
    let e1 = (-tr / t1).exp();
    s0 * flip_angle.sin() * (1.0 - e1) / (1.0 - flip_angle.cos() * e1)
}

/// [`spgr_signal`] with the physical preconditions enforced.
pub fn spgr_signal_checked(s0: f64, t1: f64, flip_angle: f64, tr: f64) -> Result<f64, FitError> {
    check_tr(tr)?;
    check_flip_angle(flip_angle)?;
    if !(t1.is_finite() && t1 > 0.0) {
        return Err(FitError::domain(format!("T1 must be finite and > 0, got {t1}")));
    }
    if !s0.is_finite() {
        return Err(FitError::domain(format!("S0 must be finite, got {s0}")));
    }
    Ok(spgr_signal(s0, t1, flip_angle, tr))
}

/// SPGR signal and its partial derivatives with respect to `s0` and `t1`.
pub(crate) fn spgr_signal_with_partials(s0: f64, t1: f64, flip_angle: f64, tr: f64) -> (f64, f64, f64) {
    let e1 = (-tr / t1).exp();
    let (sin_a, cos_a) = flip_angle.sin_cos();
    let denom = 1.0 - cos_a * e1;

    let d_s0 = sin_a * (1.0 - e1) / denom;
    let value = s0 * d_s0;
    let d_e1 = s0 * sin_a * (cos_a - 1.0) / (denom * denom);
    let d_t1 = d_e1 * e1 * tr / (t1 * t1);

    (value, d_s0, d_t1)
}

pub(crate) fn check_tr(tr: f64) -> Result<(), FitError> {
    if tr.is_finite() && tr > 0.0 {
        Ok(())
    } else {
        Err(FitError::domain(format!("TR must be finite and > 0, got {tr}")))
    }
}

pub(crate) fn check_flip_angle(flip_angle: f64) -> Result<(), FitError> {
    if flip_angle.is_finite() && flip_angle > 0.0 && flip_angle < std::f64::consts::PI {
        Ok(())
    } else {
        Err(FitError::domain(format!(
            "flip angle must lie in (0, π) rad, got {flip_angle}"
        )))
    }
}

/// Signal model used by the DCE conversions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SignalModel {
    /// Spoiled gradient echo with repetition time `tr` (s), nominal flip angle
    /// `fa` (rad) and echo time `te` (s).
    Spgr { tr: f64, fa: f64, te: f64 },
}

impl SignalModel {
    /// Validated SPGR model.
    pub fn spgr(tr: f64, fa: f64, te: f64) -> Result<Self, FitError> {
        check_tr(tr)?;
        check_flip_angle(fa)?;
        if !(te.is_finite() && te >= 0.0) {
            return Err(FitError::domain(format!("TE must be finite and >= 0, got {te}")));
        }
        Ok(SignalModel::Spgr { tr, fa, te })
    }

    /// Signal for relaxation rates `r1`, `r2s` (s⁻¹) and B1 factor `k`.
    pub fn r_to_s(&self, s0: f64, r1: f64, r2s: f64, k: f64) -> f64 {
        match *self {
            SignalModel::Spgr { tr, fa, te } => {
                let e1 = (-tr * r1).exp();
                let fa = k * fa;
                s0 * ((1.0 - e1) * fa.sin()) / (1.0 - e1 * fa.cos()) * (-te * r2s).exp()
            }
        }
    }
}
