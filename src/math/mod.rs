//! Numerical building blocks: least squares, Levenberg–Marquardt, root
//! finding and cumulative integration.

pub mod integrate;
pub mod lm;
pub mod ols;
pub mod root;

pub use integrate::*;
pub use lm::*;
pub use ols::*;
pub use root::*;
