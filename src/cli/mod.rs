//! Command-line parsing for the `dce` binary.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! fitting code. Flip angles are given in degrees on the command line and
//! converted to radians when the run configuration is built.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::data::QIBA_FLIP_ANGLES_DEG;
use crate::domain::VfaMethod;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "dce", version, about = "VFA T1 and DCE-MRI model fitting")]
pub struct Cli {
    /// Log level (overridden by RUST_LOG).
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run all three VFA estimators on the QIBA DRO demo voxel.
    Qiba(QibaArgs),
    /// Write a synthetic noisy VFA voxel CSV.
    Sample(SampleArgs),
    /// Fit a T1 map over a voxel CSV.
    T1(T1Args),
}

/// Levenberg–Marquardt settings for the non-linear estimator.
#[derive(Debug, Args, Clone)]
pub struct LmArgs {
    /// Iteration cap for the non-linear fit.
    #[arg(long, default_value_t = 200)]
    pub max_iterations: usize,

    /// Relative step tolerance for the non-linear fit.
    #[arg(long, default_value_t = 1e-8)]
    pub tolerance: f64,
}

#[derive(Debug, Args, Clone)]
pub struct QibaArgs {
    #[command(flatten)]
    pub lm: LmArgs,
}

#[derive(Debug, Args, Clone)]
pub struct SampleArgs {
    /// Equilibrium signal.
    #[arg(long, default_value_t = 50_000.0)]
    pub s0: f64,

    /// True T1 (s).
    #[arg(long, default_value_t = 1.0)]
    pub t1: f64,

    /// Repetition time (s).
    #[arg(long, default_value_t = 0.005)]
    pub tr: f64,

    /// Flip angles (degrees, comma-separated).
    #[arg(long = "fa", value_delimiter = ',', default_values_t = QIBA_FLIP_ANGLES_DEG)]
    pub flip_angles_deg: Vec<f64>,

    /// Standard deviation of additive Gaussian noise.
    #[arg(long, default_value_t = 0.0)]
    pub noise_sd: f64,

    /// Number of voxels.
    #[arg(short = 'n', long, default_value_t = 100)]
    pub count: usize,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output CSV path.
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct T1Args {
    /// Voxel CSV (`id` plus one signal column per flip angle).
    #[arg(short, long)]
    pub input: PathBuf,

    /// Flip angles (degrees, comma-separated), in column order.
    #[arg(long = "fa", value_delimiter = ',', required = true)]
    pub flip_angles_deg: Vec<f64>,

    /// Repetition time (s).
    #[arg(long)]
    pub tr: f64,

    /// Estimator.
    #[arg(long, value_enum, default_value_t = VfaMethod::Nonlinear)]
    pub method: VfaMethod,

    /// Export per-voxel results to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export the run summary to JSON.
    #[arg(long)]
    pub json: Option<PathBuf>,

    #[command(flatten)]
    pub lm: LmArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_t1_command() {
        let cli = Cli::parse_from([
            "dce", "t1", "-i", "vox.csv", "--fa", "3,15,35", "--tr", "0.005", "--method", "two-point",
        ]);
        let Command::T1(args) = cli.command else {
            panic!("expected t1 subcommand");
        };
        assert_eq!(args.flip_angles_deg, [3.0, 15.0, 35.0]);
        assert_eq!(args.method, VfaMethod::TwoPoint);
        assert_eq!(args.lm.max_iterations, 200);
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn sample_defaults_to_qiba_angles() {
        let cli = Cli::parse_from(["dce", "sample", "-o", "out.csv", "--log-level", "debug"]);
        let Command::Sample(args) = cli.command else {
            panic!("expected sample subcommand");
        };
        assert_eq!(args.flip_angles_deg, QIBA_FLIP_ANGLES_DEG);
        assert_eq!(cli.log_level, "debug");
    }
}
