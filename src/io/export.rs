//! Exports: voxel signal CSV, per-voxel T1 CSV, JSON run summary.
//!
//! Outputs are meant to be easy to consume in spreadsheets or downstream
//! scripts. The voxel CSV is also what `dce t1` reads back.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;

use crate::domain::{VoxelSignal, VoxelT1};
use crate::error::AppError;
use crate::report::T1MapSummary;

/// Write voxel signals with one `fa_<deg>` column per flip angle.
pub fn write_voxels_csv(path: &Path, voxels: &[VoxelSignal], flip_angles_deg: &[f64]) -> Result<(), AppError> {
    let file = create(path, "voxel CSV")?;
    let mut out = BufWriter::new(file);

    let mut header = String::from("id");
    for deg in flip_angles_deg {
        header.push_str(&format!(",fa_{deg}"));
    }
    writeln!(out, "{header}").map_err(|e| AppError::new(2, format!("Failed to write voxel CSV header: {e}")))?;

    for v in voxels {
        if v.signal.len() != flip_angles_deg.len() {
            return Err(AppError::new(
                3,
                format!(
                    "Voxel '{}' has {} samples for {} flip angles.",
                    v.id,
                    v.signal.len(),
                    flip_angles_deg.len()
                ),
            ));
        }
        let row: Vec<String> = v.signal.iter().map(|s| format!("{s:.6}")).collect();
        writeln!(out, "{},{}", v.id, row.join(","))
            .map_err(|e| AppError::new(2, format!("Failed to write voxel CSV row: {e}")))?;
    }

    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush voxel CSV: {e}")))?;
    info!("wrote {} voxels to '{}'", voxels.len(), path.display());
    Ok(())
}

/// Write one row per voxel: estimates for successful fits, error kind and
/// message for failed ones.
pub fn write_t1_csv(path: &Path, results: &[VoxelT1]) -> Result<(), AppError> {
    let file = create(path, "T1 CSV")?;
    let mut out = BufWriter::new(file);

    writeln!(out, "id,status,s0,t1,r1,error")
        .map_err(|e| AppError::new(2, format!("Failed to write T1 CSV header: {e}")))?;

    for r in results {
        let line = match &r.fit {
            Ok(fit) => format!("{},ok,{:.6},{:.8},{:.8},", r.id, fit.s0, fit.t1, fit.r1()),
            Err(err) => format!("{},{},,,,{}", r.id, err.kind_label(), csv_quote(&err.to_string())),
        };
        writeln!(out, "{line}").map_err(|e| AppError::new(2, format!("Failed to write T1 CSV row: {e}")))?;
    }

    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush T1 CSV: {e}")))?;
    info!("wrote {} T1 results to '{}'", results.len(), path.display());
    Ok(())
}

/// Write the run summary as pretty-printed JSON.
pub fn write_summary_json(path: &Path, summary: &T1MapSummary) -> Result<(), AppError> {
    let file = create(path, "summary JSON")?;
    serde_json::to_writer_pretty(file, summary)
        .map_err(|e| AppError::new(2, format!("Failed to write summary JSON: {e}")))?;
    info!("wrote run summary to '{}'", path.display());
    Ok(())
}

fn create(path: &Path, what: &str) -> Result<File, AppError> {
    File::create(path).map_err(|e| AppError::new(2, format!("Failed to create {what} '{}': {e}", path.display())))
}

fn csv_quote(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
