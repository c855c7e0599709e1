//! Water-exchange models: compartment relaxation rates → relaxation components.
//!
//! Each model turns per-compartment R1 values and population fractions into a
//! list of exponential R1 components, each with its own population. The total
//! signal is the population-weighted sum of the per-component signals.

use serde::{Deserialize, Serialize};

use crate::domain::{Compartment, PerCompartment};

/// One R1 relaxation component and its spin population fraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct R1Component {
    pub r1: f64,
    pub population: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaterExchangeModel {
    /// Fast exchange limit: a single component with the population-weighted
    /// mean R1.
    Fxl,
    /// No exchange limit: one component per compartment.
    Nxl,
}

impl WaterExchangeModel {
    pub fn r1_components(&self, p: &PerCompartment<f64>, r1: &PerCompartment<f64>) -> Vec<R1Component> {
        match self {
            WaterExchangeModel::Fxl => {
                let mean: f64 = Compartment::ALL
                    .iter()
                    .map(|&c| p.get(c) * r1.get(c))
                    .sum();
                vec![R1Component {
                    r1: mean,
                    population: 1.0,
                }]
            }
            WaterExchangeModel::Nxl => Compartment::ALL
                .iter()
                .map(|&c| R1Component {
                    r1: *r1.get(c),
                    population: *p.get(c),
                })
                .collect(),
        }
    }
}
