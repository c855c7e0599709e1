//! `dce-fit` library crate.
//!
//! The binary (`dce`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the estimators and DCE conversions are usable from other Rust code
//!
//! Layout:
//!
//! - `models`: forward models (signal, relaxivity, water exchange, AIF, PK)
//! - `fit`: VFA T1 estimators, DCE conversions and PK fits
//! - `math`: least squares, Levenberg–Marquardt, root finding, integration

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod logging;
pub mod math;
pub mod models;
pub mod report;
