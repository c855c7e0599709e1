//! Fitting routines.
//!
//! Responsibilities:
//!
//! - VFA T1 estimation (two-point, linear, non-linear) and voxel maps
//! - DCE conversions between signal, enhancement and concentration
//! - pharmacokinetic parameter fits with multi-start selection

pub mod dce;
pub mod selection;
pub mod vfa;

pub use dce::*;
pub use selection::*;
pub use vfa::*;
