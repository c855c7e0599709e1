//! Forward models.
//!
//! Each family is a closed enum with explicit dispatch, so fitting code can
//! stay generic over the model kind:
//!
//! - `signal`: relaxation → MRI signal (SPGR)
//! - `relaxivity`: concentration → relaxation rates
//! - `water_exchange`: compartment R1 → relaxation components
//! - `aif`: arterial input functions
//! - `pk`: pharmacokinetic models

pub mod aif;
pub mod pk;
pub mod relaxivity;
pub mod signal;
pub mod water_exchange;

pub use aif::*;
pub use pk::*;
pub use relaxivity::*;
pub use signal::*;
pub use water_exchange::*;
