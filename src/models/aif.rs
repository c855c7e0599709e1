//! Arterial input functions (AIFs).
//!
//! An AIF gives the arterial plasma concentration `c_ap(t)` (mM) at time `t`
//! (s). Pharmacokinetic models sample it on their own time grid.

use serde::{Deserialize, Serialize};

use crate::error::FitError;
use crate::math::interp_linear_or_zero;

// Parker et al. (2006) population blood curve, time in minutes.
const PARKER_A1: f64 = 0.809;
const PARKER_A2: f64 = 0.330;
const PARKER_T1: f64 = 0.17046;
const PARKER_T2: f64 = 0.365;
const PARKER_SIGMA1: f64 = 0.0563;
const PARKER_SIGMA2: f64 = 0.132;
const PARKER_ALPHA: f64 = 1.050;
const PARKER_BETA: f64 = 0.1685;
const PARKER_S: f64 = 38.078;
const PARKER_TAU: f64 = 0.483;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Aif {
    /// Measured plasma concentration, linearly interpolated; zero outside the
    /// sampled interval.
    Patient { t: Vec<f64>, c_ap: Vec<f64> },
    /// Parker population AIF converted to plasma with haematocrit `hct`,
    /// starting at `t_start` (s).
    Parker { hct: f64, t_start: f64 },
}

impl Aif {
    pub fn patient(t: Vec<f64>, c_ap: Vec<f64>) -> Result<Self, FitError> {
        if t.is_empty() {
            return Err(FitError::shape("patient AIF needs at least one sample"));
        }
        if t.len() != c_ap.len() {
            return Err(FitError::shape(format!(
                "patient AIF has {} times but {} concentrations",
                t.len(),
                c_ap.len()
            )));
        }
        if t.iter().chain(c_ap.iter()).any(|v| !v.is_finite()) {
            return Err(FitError::domain("patient AIF contains non-finite values"));
        }
        if t.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(FitError::domain("patient AIF times must be strictly increasing"));
        }
        Ok(Aif::Patient { t, c_ap })
    }

    pub fn parker(hct: f64, t_start: f64) -> Result<Self, FitError> {
        if !(hct.is_finite() && (0.0..1.0).contains(&hct)) {
            return Err(FitError::domain(format!("haematocrit must lie in [0, 1), got {hct}")));
        }
        if !t_start.is_finite() {
            return Err(FitError::domain("AIF start time must be finite"));
        }
        Ok(Aif::Parker { hct, t_start })
    }

    /// Arterial plasma concentration (mM) at `t` (s).
    pub fn c_ap(&self, t: f64) -> f64 {
        match self {
            Aif::Patient { t: ts, c_ap } => interp_linear_or_zero(ts, c_ap, t),
            Aif::Parker { hct, t_start } => {
                if t < *t_start {
                    return 0.0;
                }
                parker_blood((t - t_start) / 60.0) / (1.0 - hct)
            }
        }
    }

    /// `c_ap` sampled at every time in `t`.
    pub fn sample(&self, t: &[f64]) -> Vec<f64> {
        t.iter().map(|&ti| self.c_ap(ti)).collect()
    }
}

/// Parker whole-blood concentration (mM) at `t_min` minutes after injection.
fn parker_blood(t_min: f64) -> f64 {
    let gauss = |a: f64, centre: f64, sigma: f64| {
        a / (sigma * (2.0 * std::f64::consts::PI).sqrt())
            * (-(t_min - centre).powi(2) / (2.0 * sigma * sigma)).exp()
    };
    gauss(PARKER_A1, PARKER_T1, PARKER_SIGMA1)
        + gauss(PARKER_A2, PARKER_T2, PARKER_SIGMA2)
        + PARKER_ALPHA * (-PARKER_BETA * t_min).exp() / (1.0 + (-PARKER_S * (t_min - PARKER_TAU)).exp())
}
