//! Domain types used throughout the crate.
//!
//! This module defines:
//!
//! - estimator selection (`VfaMethod`) and fit outputs (`T1Fit`)
//! - compartment bookkeeping (`Compartment`, `PerCompartment`)
//! - run configurations built from CLI flags

pub mod types;

pub use types::*;
