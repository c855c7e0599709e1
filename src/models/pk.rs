//! Pharmacokinetic (PK) models.
//!
//! A PK model turns a parameter vector into tissue concentration time courses
//! on a fixed time grid, given an arterial input function. Every model kind
//! exposes the same capability contract: parameter names, typical values (used
//! as default start and for normalization during fitting), bounds, and forward
//! evaluation ([`PkModel::conc`]).
//!
//! Time is in seconds; permeability-surface area products are in min⁻¹.

use serde::{Deserialize, Serialize};

use crate::error::FitError;
use crate::math::cumulative_trapezoid;
use crate::models::aif::Aif;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PkModelKind {
    /// Intravascular tracer only: `C_t = vp·c_ap`.
    SteadyStateVp,
    /// Irreversible uptake: `C_t = vp·c_ap + ps·∫c_ap`.
    Patlak,
}

impl PkModelKind {
    pub fn display_name(self) -> &'static str {
        match self {
            PkModelKind::SteadyStateVp => "steady-state vp",
            PkModelKind::Patlak => "Patlak",
        }
    }

    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            PkModelKind::SteadyStateVp => &["vp"],
            PkModelKind::Patlak => &["vp", "ps"],
        }
    }

    pub fn param_count(self) -> usize {
        self.param_names().len()
    }

    pub fn typical_values(self) -> Vec<f64> {
        match self {
            PkModelKind::SteadyStateVp => vec![0.1],
            PkModelKind::Patlak => vec![0.1, 1e-3],
        }
    }

    /// Inclusive `(lower, upper)` bound per parameter.
    pub fn bounds(self) -> Vec<(f64, f64)> {
        match self {
            PkModelKind::SteadyStateVp => vec![(0.0, 1.0)],
            PkModelKind::Patlak => vec![(0.0, 1.0), (-1e-2, 1.0)],
        }
    }
}

/// Concentration time courses predicted by a PK model (mM).
#[derive(Debug, Clone, PartialEq)]
pub struct Concentrations {
    /// `C_t`: tracer per unit tissue volume.
    pub tissue: Vec<f64>,
    /// `C_cp`: capillary plasma contribution per unit tissue volume.
    pub plasma: Vec<f64>,
    /// `C_e`: extravascular extracellular contribution per unit tissue volume.
    pub ees: Vec<f64>,
}

/// A PK model bound to its time grid and AIF.
#[derive(Debug, Clone, PartialEq)]
pub struct PkModel {
    kind: PkModelKind,
    t: Vec<f64>,
    c_ap: Vec<f64>,
    /// `∫₀ᵗ c_ap` in mM·min.
    c_ap_integral: Vec<f64>,
}

impl PkModel {
    pub fn new(kind: PkModelKind, t: Vec<f64>, aif: &Aif) -> Result<Self, FitError> {
        if t.is_empty() {
            return Err(FitError::shape("PK model needs at least one time point"));
        }
        if t.iter().any(|v| !v.is_finite()) {
            return Err(FitError::domain("PK model time grid contains non-finite values"));
        }
        let c_ap = aif.sample(&t);
        let c_ap_integral = cumulative_trapezoid(&t, &c_ap)?
            .into_iter()
            .map(|v| v / 60.0)
            .collect();
        Ok(Self {
            kind,
            t,
            c_ap,
            c_ap_integral,
        })
    }

    pub fn kind(&self) -> PkModelKind {
        self.kind
    }

    pub fn n_points(&self) -> usize {
        self.t.len()
    }

    /// Value of the named parameter, if this model has it.
    pub fn param(&self, params: &[f64], name: &str) -> Option<f64> {
        self.kind
            .param_names()
            .iter()
            .position(|n| *n == name)
            .and_then(|idx| params.get(idx).copied())
    }

    /// Clamp `params` into the model bounds.
    pub fn clamp(&self, params: &mut [f64]) {
        for (p, (lo, hi)) in params.iter_mut().zip(self.kind.bounds()) {
            *p = p.clamp(lo, hi);
        }
    }

    /// Forward model: concentration time courses for `params`.
    pub fn conc(&self, params: &[f64]) -> Result<Concentrations, FitError> {
        let expected = self.kind.param_count();
        if params.len() != expected {
            return Err(FitError::shape(format!(
                "{} takes {expected} parameters ({}), got {}",
                self.kind.display_name(),
                self.kind.param_names().join(", "),
                params.len()
            )));
        }
        if params.iter().any(|v| !v.is_finite()) {
            return Err(FitError::domain("PK parameters must be finite"));
        }

        let vp = params[0];
        let plasma: Vec<f64> = self.c_ap.iter().map(|c| vp * c).collect();
        let ees: Vec<f64> = match self.kind {
            PkModelKind::SteadyStateVp => vec![0.0; self.t.len()],
            PkModelKind::Patlak => {
                let ps = params[1];
                self.c_ap_integral.iter().map(|i| ps * i).collect()
            }
        };
        let tissue = plasma.iter().zip(ees.iter()).map(|(p, e)| p + e).collect();

        Ok(Concentrations { tissue, plasma, ees })
    }
}
