//! Reporting utilities: T1 map summaries and the QIBA comparison.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{T1Fit, VfaMethod, VoxelT1};
use crate::error::FitError;

pub mod format;

pub use format::*;

/// Order statistics of a set of estimates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

impl ValueStats {
    /// `None` for an empty slice.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
        };
        Some(Self {
            min: sorted[0],
            max: sorted[n - 1],
            mean: sorted.iter().sum::<f64>() / n as f64,
            median,
        })
    }
}

/// Summary of a `dce t1` run (also the JSON export schema).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct T1MapSummary {
    pub method: VfaMethod,
    pub tr: f64,
    pub flip_angles_deg: Vec<f64>,
    pub voxels: usize,
    pub fitted: usize,
    /// Failed voxel count per error kind.
    pub failures: BTreeMap<&'static str, usize>,
    pub t1: Option<ValueStats>,
    pub s0: Option<ValueStats>,
}

pub fn summarize_t1_map(results: &[VoxelT1], method: VfaMethod, tr: f64, flip_angles_deg: &[f64]) -> T1MapSummary {
    let fits: Vec<&T1Fit> = results.iter().filter_map(|r| r.fit.as_ref().ok()).collect();
    let mut failures = BTreeMap::new();
    for err in results.iter().filter_map(|r| r.fit.as_ref().err()) {
        *failures.entry(err.kind_label()).or_insert(0) += 1;
    }

    let t1: Vec<f64> = fits.iter().map(|f| f.t1).collect();
    let s0: Vec<f64> = fits.iter().map(|f| f.s0).collect();

    T1MapSummary {
        method,
        tr,
        flip_angles_deg: flip_angles_deg.to_vec(),
        voxels: results.len(),
        fitted: fits.len(),
        failures,
        t1: ValueStats::from_values(&t1),
        s0: ValueStats::from_values(&s0),
    }
}

/// One estimator's result on the QIBA demo voxel.
#[derive(Debug, Clone)]
pub struct QibaRow {
    pub method: VfaMethod,
    pub fit: Result<T1Fit, FitError>,
}

/// Relative errors `(S0, T1)` of `fit` against `truth`, in percent.
pub fn relative_errors_pct(fit: &T1Fit, truth: &T1Fit) -> (f64, f64) {
    (
        100.0 * (fit.s0 - truth.s0) / truth.s0,
        100.0 * (fit.t1 - truth.t1) / truth.t1,
    )
}
