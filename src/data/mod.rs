//! Built-in datasets.
//!
//! - seeded synthetic VFA phantoms (`sample`)
//! - the QIBA DRO demo voxel and its ground truth (`qiba`)

pub mod qiba;
pub mod sample;

pub use qiba::*;
pub use sample::*;
