//! QIBA DRO (digital reference object) demo voxel.
//!
//! One voxel of the QIBA T1 phantom, acquired with six flip angles. The
//! phantom's ground truth is S0 = 50000 and T1 = 1/√2 s.

use crate::domain::T1Fit;

/// Nominal flip angles (degrees).
pub const QIBA_FLIP_ANGLES_DEG: [f64; 6] = [3.0, 6.0, 9.0, 15.0, 24.0, 35.0];

/// Repetition time (s).
pub const QIBA_TR: f64 = 0.005;

/// Measured signal, one value per flip angle.
pub const QIBA_SIGNAL: [f64; 6] = [2193.0, 2949.0, 2859.0, 2227.0, 1541.0, 1084.0];

/// Phantom ground truth.
pub const QIBA_TRUTH: T1Fit = T1Fit {
    s0: 50_000.0,
    t1: std::f64::consts::FRAC_1_SQRT_2,
};

/// Flip angles in radians.
pub fn qiba_flip_angles() -> Vec<f64> {
    QIBA_FLIP_ANGLES_DEG.iter().map(|d| d.to_radians()).collect()
}
