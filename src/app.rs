//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and starts logging
//! - parses CLI arguments into run configurations
//! - runs the requested workflow
//! - prints reports and writes optional exports

use std::f64::consts::PI;

use clap::Parser;
use log::debug;

use crate::cli::{Cli, Command, LmArgs, QibaArgs, SampleArgs, T1Args};
use crate::data::{QIBA_TRUTH, generate_sample};
use crate::domain::{SampleConfig, T1RunConfig};
use crate::error::AppError;
use crate::io::export::{write_summary_json, write_t1_csv, write_voxels_csv};
use crate::logging::setup_logging;
use crate::math::LmConfig;
use crate::report::{format_qiba_table, format_row_errors, format_t1_summary};

pub mod pipeline;

/// Maximum number of skipped input rows listed in the terminal report.
const MAX_LISTED_ROW_ERRORS: usize = 10;

/// Entry point for the `dce` binary.
pub fn run() -> Result<(), AppError> {
    // `.env` may set RUST_LOG; a missing file is fine.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let _logger = setup_logging(&cli.log_level)?;
    debug!("{:?}", cli.command);

    match cli.command {
        Command::Qiba(args) => handle_qiba(args),
        Command::Sample(args) => handle_sample(args),
        Command::T1(args) => handle_t1(args),
    }
}

fn handle_qiba(args: QibaArgs) -> Result<(), AppError> {
    let lm = lm_config_from_args(&args.lm)?;
    let rows = pipeline::run_qiba(&lm);
    println!("{}", format_qiba_table(&rows, &QIBA_TRUTH));
    Ok(())
}

fn handle_sample(args: SampleArgs) -> Result<(), AppError> {
    let config = sample_config_from_args(&args)?;
    let sample = generate_sample(&config)?;
    write_voxels_csv(&args.output, &sample.voxels, &args.flip_angles_deg)?;
    println!(
        "Wrote {} voxels to {} (S0={}, T1={} s, noise sd={})",
        sample.voxels.len(),
        args.output.display(),
        sample.truth.s0,
        sample.truth.t1,
        config.noise_sd
    );
    Ok(())
}

fn handle_t1(args: T1Args) -> Result<(), AppError> {
    let config = t1_config_from_args(&args)?;
    let run = pipeline::run_t1(&config)?;

    println!("{}", format_t1_summary(&run.summary));
    let skipped = format_row_errors(&run.ingest.row_errors, MAX_LISTED_ROW_ERRORS);
    if !skipped.is_empty() {
        println!("{skipped}");
    }

    if let Some(path) = &config.export {
        write_t1_csv(path, &run.results)?;
    }
    if let Some(path) = &config.export_json {
        write_summary_json(path, &run.summary)?;
    }

    Ok(())
}

pub fn t1_config_from_args(args: &T1Args) -> Result<T1RunConfig, AppError> {
    if !(args.tr.is_finite() && args.tr > 0.0) {
        return Err(AppError::new(2, format!("TR must be > 0 s, got {}.", args.tr)));
    }
    Ok(T1RunConfig {
        input: args.input.clone(),
        flip_angles: flip_angles_from_degrees(&args.flip_angles_deg)?,
        tr: args.tr,
        method: args.method,
        export: args.export.clone(),
        export_json: args.json.clone(),
        lm: lm_config_from_args(&args.lm)?,
    })
}

pub fn sample_config_from_args(args: &SampleArgs) -> Result<SampleConfig, AppError> {
    Ok(SampleConfig {
        s0: args.s0,
        t1: args.t1,
        tr: args.tr,
        flip_angles: flip_angles_from_degrees(&args.flip_angles_deg)?,
        noise_sd: args.noise_sd,
        count: args.count,
        seed: args.seed,
    })
}

pub fn lm_config_from_args(args: &LmArgs) -> Result<LmConfig, AppError> {
    if args.max_iterations == 0 {
        return Err(AppError::new(2, "--max-iterations must be > 0."));
    }
    if !(args.tolerance.is_finite() && args.tolerance > 0.0) {
        return Err(AppError::new(2, "--tolerance must be > 0."));
    }
    Ok(LmConfig {
        max_iterations: args.max_iterations,
        tolerance: args.tolerance,
        ..LmConfig::default()
    })
}

fn flip_angles_from_degrees(degrees: &[f64]) -> Result<Vec<f64>, AppError> {
    if degrees.len() < 2 {
        return Err(AppError::new(2, "At least two flip angles are required."));
    }
    degrees
        .iter()
        .map(|&d| {
            let rad = d.to_radians();
            if rad.is_finite() && rad > 0.0 && rad < PI {
                Ok(rad)
            } else {
                Err(AppError::new(2, format!("Flip angle {d} deg is outside (0, 180).")))
            }
        })
        .collect()
}
