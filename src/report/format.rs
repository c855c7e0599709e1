//! Formatted terminal output.
//!
//! Formatting lives in one place so the fitting code stays free of
//! presentation concerns.

use crate::domain::T1Fit;
use crate::io::ingest::RowError;
use crate::report::{QibaRow, T1MapSummary, ValueStats, relative_errors_pct};

/// Format the `dce t1` run summary.
pub fn format_t1_summary(summary: &T1MapSummary) -> String {
    let mut out = String::new();

    out.push_str("=== dce - VFA T1 map ===\n");
    out.push_str(&format!("Method: {}\n", summary.method.display_name()));
    out.push_str(&format!("TR: {} s\n", summary.tr));
    out.push_str(&format!("Flip angles: {} deg\n", fmt_vec(&summary.flip_angles_deg, 2)));
    out.push_str(&format!(
        "Voxels: n={} | fitted={} | failed={}\n",
        summary.voxels,
        summary.fitted,
        summary.voxels - summary.fitted
    ));
    for (kind, count) in &summary.failures {
        out.push_str(&format!("  {kind}: {count}\n"));
    }

    out.push('\n');
    out.push_str(&format_stats_header());
    if let Some(t1) = &summary.t1 {
        out.push_str(&format_stats_row("T1 (s)", t1));
    }
    if let Some(s0) = &summary.s0 {
        out.push_str(&format_stats_row("S0", s0));
    }

    out
}

/// List skipped input rows, at most `limit` of them.
pub fn format_row_errors(errors: &[RowError], limit: usize) -> String {
    if errors.is_empty() {
        return String::new();
    }
    let mut out = format!("Skipped {} input rows:\n", errors.len());
    for e in errors.iter().take(limit) {
        match &e.id {
            Some(id) => out.push_str(&format!("  line {} ({id}): {}\n", e.line, e.message)),
            None => out.push_str(&format!("  line {}: {}\n", e.line, e.message)),
        }
    }
    if errors.len() > limit {
        out.push_str(&format!("  ... and {} more\n", errors.len() - limit));
    }
    out
}

/// Compare each estimator on the QIBA voxel against the phantom truth.
pub fn format_qiba_table(rows: &[QibaRow], truth: &T1Fit) -> String {
    let mut out = String::new();

    out.push_str("=== dce - QIBA DRO demo voxel ===\n");
    out.push_str(&format!("Ground truth: S0={:.1} T1={:.4} s\n\n", truth.s0, truth.t1));
    out.push_str(&format!(
        "{:<12} {:>12} {:>10} {:>10} {:>10}\n",
        "method", "S0", "T1 (s)", "dS0 %", "dT1 %"
    ));
    out.push_str(&format!("{:-<12} {:-<12} {:-<10} {:-<10} {:-<10}\n", "", "", "", "", ""));

    for row in rows {
        let line = match &row.fit {
            Ok(fit) => {
                let (ds0, dt1) = relative_errors_pct(fit, truth);
                format!(
                    "{:<12} {:>12.1} {:>10.4} {:>10.3} {:>10.3}",
                    row.method.display_name(),
                    fit.s0,
                    fit.t1,
                    ds0,
                    dt1
                )
            }
            Err(err) => format!("{:<12} failed: {err}", row.method.display_name()),
        };
        out.push_str(&line);
        out.push('\n');
    }

    out
}

fn format_stats_header() -> String {
    format!(
        "{:<8} {:>12} {:>12} {:>12} {:>12}\n",
        "", "min", "median", "mean", "max"
    )
}

fn format_stats_row(label: &str, s: &ValueStats) -> String {
    format!(
        "{:<8} {:>12.4} {:>12.4} {:>12.4} {:>12.4}\n",
        label, s.min, s.median, s.mean, s.max
    )
}

fn fmt_vec(v: &[f64], decimals: usize) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.decimals$}")).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::VfaMethod;
    use crate::error::FitError;

    #[test]
    fn qiba_table_shows_errors_and_failures() {
        let truth = T1Fit { s0: 100.0, t1: 1.0 };
        let rows = vec![
            QibaRow {
                method: VfaMethod::Linear,
                fit: Ok(T1Fit { s0: 101.0, t1: 0.99 }),
            },
            QibaRow {
                method: VfaMethod::Nonlinear,
                fit: Err(FitError::convergence(200, "tolerance not met")),
            },
        ];
        let table = format_qiba_table(&rows, &truth);
        assert!(table.contains("linear"));
        assert!(table.contains("1.000"));
        assert!(table.contains("-1.000"));
        assert!(table.contains("non-linear   failed: convergence error after 200 iterations"));
    }

    #[test]
    fn row_errors_are_truncated() {
        let errors: Vec<RowError> = (0..5)
            .map(|i| RowError {
                line: i + 2,
                id: None,
                message: "bad".to_string(),
            })
            .collect();
        let text = format_row_errors(&errors, 2);
        assert!(text.starts_with("Skipped 5 input rows:\n"));
        assert!(text.contains("line 3: bad"));
        assert!(!text.contains("line 4"));
        assert!(text.ends_with("... and 3 more\n"));
        assert!(format_row_errors(&[], 2).is_empty());
    }
}
