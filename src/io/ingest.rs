//! Voxel CSV ingest.
//!
//! Input layout: one row per voxel, an `id` column, and one signal column per
//! flip angle (in acquisition order). Any header names other than `id` are
//! accepted for the signal columns; their order is what matters.
//!
//! Design goals:
//! - **Strict schema**: missing `id` or a column count that disagrees with the
//!   flip angles is a hard error (exit code 2)
//! - **Row-level validation**: bad rows are skipped and reported, not fatal
//! - **No fitting logic here**

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use log::{info, warn};

use crate::domain::VoxelSignal;
use crate::error::AppError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub id: Option<String>,
    pub message: String,
}

/// Ingest output: parsed voxels plus what was skipped.
#[derive(Debug, Clone)]
pub struct VoxelIngest {
    pub voxels: Vec<VoxelSignal>,
    /// Signal column headers, in file order.
    pub signal_columns: Vec<String>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Load voxel signals from a CSV file.
pub fn load_voxels(path: &Path, n_flip_angles: usize) -> Result<VoxelIngest, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    let ingest = read_voxels(file, n_flip_angles)?;
    info!(
        "read {} voxels from '{}' ({} rows, {} skipped)",
        ingest.voxels.len(),
        path.display(),
        ingest.rows_read,
        ingest.row_errors.len()
    );
    Ok(ingest)
}

/// Parse voxel signals from any CSV source.
pub fn read_voxels<R: Read>(source: R, n_flip_angles: usize) -> Result<VoxelIngest, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();

    let header_map = build_header_map(&headers);
    let Some(&id_col) = header_map.get("id") else {
        return Err(AppError::new(2, "Missing required column: `id`"));
    };

    let signal_cols: Vec<usize> = (0..headers.len()).filter(|&i| i != id_col).collect();
    if signal_cols.len() != n_flip_angles {
        return Err(AppError::new(
            2,
            format!(
                "CSV has {} signal columns but {n_flip_angles} flip angles were given.",
                signal_cols.len()
            ),
        ));
    }
    let signal_columns: Vec<String> = signal_cols
        .iter()
        .map(|&i| normalize_header_name(&headers[i]))
        .collect();

    let mut voxels = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, id_col, &signal_cols, &signal_columns) {
            Ok(voxel) => voxels.push(voxel),
            Err((id, message)) => row_errors.push(RowError { line, id, message }),
        }
    }

    for err in &row_errors {
        warn!("skipping line {}: {}", err.line, err.message);
    }

    if voxels.is_empty() {
        return Err(AppError::new(3, "No valid voxel rows in CSV."));
    }

    Ok(VoxelIngest {
        voxels,
        signal_columns,
        row_errors,
        rows_read,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Strip a UTF-8 BOM that spreadsheet exports put on the first header.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn parse_row(
    record: &StringRecord,
    id_col: usize,
    signal_cols: &[usize],
    signal_names: &[String],
) -> Result<VoxelSignal, (Option<String>, String)> {
    let id = match record.get(id_col) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => return Err((None, "Missing `id`.".to_string())),
    };

    let mut signal = Vec::with_capacity(signal_cols.len());
    for (&col, name) in signal_cols.iter().zip(signal_names.iter()) {
        let raw = record
            .get(col)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| (Some(id.clone()), format!("Missing value for `{name}`.")))?;
        let value: f64 = raw
            .parse()
            .map_err(|_| (Some(id.clone()), format!("Invalid number for `{name}`: '{raw}'.")))?;
        if !value.is_finite() {
            return Err((Some(id.clone()), format!("Non-finite value for `{name}`.")));
        }
        signal.push(value);
    }

    Ok(VoxelSignal { id, signal })
}
