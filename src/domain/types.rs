//! Shared domain types.
//!
//! These types are kept small and serializable so they can be:
//!
//! - passed between the estimators and the voxel-map driver
//! - exported to CSV/JSON
//! - built from CLI flags

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::FitError;
use crate::math::LmConfig;

/// Which VFA T1 estimator to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VfaMethod {
    /// Closed form from two flip angles (first and last of the series).
    #[value(name = "two-point")]
    #[serde(rename = "two-point")]
    TwoPoint,
    /// Ordinary least squares on the linearized SPGR equation.
    Linear,
    /// Levenberg–Marquardt on the SPGR equation, seeded by the linear fit.
    Nonlinear,
}

impl VfaMethod {
    pub const ALL: [VfaMethod; 3] = [VfaMethod::TwoPoint, VfaMethod::Linear, VfaMethod::Nonlinear];

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            VfaMethod::TwoPoint => "two-point",
            VfaMethod::Linear => "linear",
            VfaMethod::Nonlinear => "non-linear",
        }
    }
}

/// Result of a VFA fit: equilibrium signal and T1 (same time unit as TR).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct T1Fit {
    pub s0: f64,
    pub t1: f64,
}

impl T1Fit {
    /// Longitudinal relaxation rate `R1 = 1/T1`.
    pub fn r1(&self) -> f64 {
        1.0 / self.t1
    }
}

/// Tissue compartments used by the water-exchange and DCE models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compartment {
    /// Capillary blood.
    Blood,
    /// Extravascular extracellular space.
    Ees,
    /// Intracellular space.
    Intracellular,
}

impl Compartment {
    pub const ALL: [Compartment; 3] = [Compartment::Blood, Compartment::Ees, Compartment::Intracellular];
}

/// One value per tissue compartment.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerCompartment<T> {
    pub b: T,
    pub e: T,
    pub i: T,
}

impl<T> PerCompartment<T> {
    pub fn new(b: T, e: T, i: T) -> Self {
        Self { b, e, i }
    }

    pub fn get(&self, c: Compartment) -> &T {
        match c {
            Compartment::Blood => &self.b,
            Compartment::Ees => &self.e,
            Compartment::Intracellular => &self.i,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> PerCompartment<U> {
        PerCompartment {
            b: f(&self.b),
            e: f(&self.e),
            i: f(&self.i),
        }
    }
}

/// Volume (and, here, spin population) fractions of the three compartments.
pub type VolumeFractions = PerCompartment<f64>;

/// One voxel's signal series, as read from an input CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelSignal {
    pub id: String,
    pub signal: Vec<f64>,
}

/// One voxel's fit outcome.
#[derive(Debug, Clone)]
pub struct VoxelT1 {
    pub id: String,
    pub fit: Result<T1Fit, FitError>,
}

/// Configuration of a `dce t1` run.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct T1RunConfig {
    pub input: PathBuf,
    /// Flip angles in radians, one per signal column.
    pub flip_angles: Vec<f64>,
    /// Repetition time (s).
    pub tr: f64,
    pub method: VfaMethod,
    pub export: Option<PathBuf>,
    pub export_json: Option<PathBuf>,
    pub lm: LmConfig,
}

/// Configuration of synthetic VFA sample generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleConfig {
    pub s0: f64,
    /// True T1 (s).
    pub t1: f64,
    /// Repetition time (s).
    pub tr: f64,
    /// Flip angles in radians.
    pub flip_angles: Vec<f64>,
    /// Standard deviation of the additive Gaussian noise (signal units).
    pub noise_sd: f64,
    /// Number of voxels to generate.
    pub count: usize,
    pub seed: u64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            s0: 50_000.0,
            t1: 1.0,
            tr: 0.005,
            flip_angles: [3.0_f64, 6.0, 9.0, 15.0, 24.0, 35.0]
                .iter()
                .map(|d| d.to_radians())
                .collect(),
            noise_sd: 0.0,
            count: 100,
            seed: 42,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_compartment_lookup_and_map() {
        let v = PerCompartment::new(0.1, 0.2, 0.7);
        assert_eq!(*v.get(Compartment::Ees), 0.2);
        let doubled = v.map(|x| x * 2.0);
        assert_eq!(doubled, PerCompartment::new(0.2, 0.4, 1.4));
    }

    #[test]
    fn method_labels_are_distinct() {
        let labels: Vec<&str> = VfaMethod::ALL.iter().map(|m| m.display_name()).collect();
        assert_eq!(labels, ["two-point", "linear", "non-linear"]);
    }
}
