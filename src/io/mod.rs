//! Input/output helpers.
//!
//! - voxel CSV ingest + validation (`ingest`)
//! - result exports (CSV/JSON) (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
