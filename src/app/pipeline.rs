//! Shared run logic behind the CLI subcommands.
//!
//! Keeping this separate from `app` means each workflow can be tested without
//! parsing arguments or printing:
//! voxel CSV -> T1 map -> summary, and QIBA voxel -> estimator comparison.

use log::info;

use crate::data::{QIBA_SIGNAL, QIBA_TR, qiba_flip_angles};
use crate::domain::{T1RunConfig, VfaMethod, VoxelT1};
use crate::error::AppError;
use crate::fit::vfa::{fit_t1_map, fit_vfa};
use crate::io::ingest::{VoxelIngest, load_voxels};
use crate::math::LmConfig;
use crate::report::{QibaRow, T1MapSummary, summarize_t1_map};

/// All computed outputs of a single `dce t1` run.
#[derive(Debug, Clone)]
pub struct T1RunOutput {
    pub ingest: VoxelIngest,
    pub results: Vec<VoxelT1>,
    pub summary: T1MapSummary,
}

/// Load the voxel CSV and fit every voxel.
pub fn run_t1(config: &T1RunConfig) -> Result<T1RunOutput, AppError> {
    let ingest = load_voxels(&config.input, config.flip_angles.len())?;

    let results = fit_t1_map(
        &ingest.voxels,
        &config.flip_angles,
        config.tr,
        config.method,
        &config.lm,
    );

    let flip_angles_deg: Vec<f64> = config.flip_angles.iter().map(|a| a.to_degrees()).collect();
    let summary = summarize_t1_map(&results, config.method, config.tr, &flip_angles_deg);
    info!("{} of {} voxels fitted", summary.fitted, summary.voxels);

    Ok(T1RunOutput {
        ingest,
        results,
        summary,
    })
}

/// Run every estimator on the QIBA demo voxel.
pub fn run_qiba(lm: &LmConfig) -> Vec<QibaRow> {
    let flip_angles = qiba_flip_angles();
    VfaMethod::ALL
        .iter()
        .map(|&method| QibaRow {
            method,
            fit: fit_vfa(method, &QIBA_SIGNAL, &flip_angles, QIBA_TR, lm),
        })
        .collect()
}
