//! Export fit results.
//!
//! - the full report as JSON (settings, cursors and every unit's outcome)
//! - a per-pixel value image as CSV, one image row per line, easy to load in
//!   spreadsheets or image tools

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::GlobalFitParams;
use crate::error::AppError;
use crate::fit::FitReport;
use crate::heuristics::CursorEstimate;

/// Schema of the JSON export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportFile {
    pub tool: String,
    pub created: DateTime<Utc>,
    pub settings: GlobalFitParams,
    pub cursors: Option<CursorEstimate>,
    pub report: FitReport,
}

impl ReportFile {
    pub fn new(settings: GlobalFitParams, cursors: Option<CursorEstimate>, report: FitReport) -> Self {
        Self {
            tool: "flim".to_string(),
            created: Utc::now(),
            settings,
            cursors,
            report,
        }
    }
}

/// Write the report JSON file.
pub fn write_report_json(path: &Path, report: &ReportFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create report JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, report)
        .map_err(|e| AppError::new(2, format!("Failed to write report JSON: {e}")))?;
    Ok(())
}

/// Write a row-major value image as CSV; `NaN` pixels are left empty.
pub fn write_value_image_csv(path: &Path, values: &[f64], width: usize) -> Result<(), AppError> {
    if width == 0 || values.len() % width != 0 {
        return Err(AppError::new(
            2,
            format!("Image of {} values does not have width {width}.", values.len()),
        ));
    }
    let mut file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create image CSV '{}': {e}", path.display())))?;

    for row in values.chunks(width) {
        let line: Vec<String> = row
            .iter()
            .map(|v| if v.is_finite() { format!("{v:.6}") } else { String::new() })
            .collect();
        writeln!(file, "{}", line.join(","))
            .map_err(|e| AppError::new(2, format!("Failed to write image CSV row: {e}")))?;
    }

    Ok(())
}
