//! Concentration → relaxation rate models.

use serde::{Deserialize, Serialize};

/// Relationship between contrast agent concentration and relaxation rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RelaxivityModel {
    /// `R1 = R10 + r1·C`, `R2 = R20 + r2·C` with relaxivities in s⁻¹·mM⁻¹.
    Linear { r1: f64, r2: f64 },
}

impl RelaxivityModel {
    /// Longitudinal relaxation rate (s⁻¹) at concentration `c` (mM).
    pub fn r1(&self, r10: f64, c: f64) -> f64 {
        match *self {
            RelaxivityModel::Linear { r1, .. } => r10 + r1 * c,
        }
    }

    /// Transverse relaxation rate (s⁻¹) at concentration `c` (mM).
    pub fn r2(&self, r20: f64, c: f64) -> f64 {
        match *self {
            RelaxivityModel::Linear { r2, .. } => r20 + r2 * c,
        }
    }
}
