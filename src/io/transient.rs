//! Read/write transient JSON files.
//!
//! A transient file is the portable representation of one measurement:
//! - bin width and decay counts
//! - optional prompt (instrument response) and per-bin sigma
//! - optional image layout (`width × height` pixel-major decays)

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::DecayImage;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransientFile {
    /// Bin width (ns).
    pub x_inc: f64,
    /// One transient, or `width·height` transients back to back.
    pub decay: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sigma: Option<Vec<f64>>,
    #[serde(default = "one")]
    pub width: usize,
    #[serde(default = "one")]
    pub height: usize,
    /// Row-major ROI labels (`0` = none).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi: Option<Vec<u32>>,
}

fn one() -> usize {
    1
}

impl TransientFile {
    pub fn single(x_inc: f64, decay: Vec<f64>, prompt: Option<Vec<f64>>) -> Self {
        Self {
            x_inc,
            decay,
            prompt,
            sigma: None,
            width: 1,
            height: 1,
            roi: None,
        }
    }

    /// Number of time bins per pixel.
    pub fn bins(&self) -> usize {
        self.decay.len() / (self.width * self.height).max(1)
    }

    pub fn to_image(&self) -> Result<DecayImage, AppError> {
        let image = DecayImage::new(self.width, self.height, self.bins(), self.decay.clone())?;
        match &self.roi {
            Some(labels) => Ok(image.with_roi(labels.clone())?),
            None => Ok(image),
        }
    }
}

/// Read a transient JSON file.
pub fn read_transient_json(path: &Path) -> Result<TransientFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open transient JSON '{}': {e}", path.display())))?;
    let transient: TransientFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid transient JSON: {e}")))?;
    if transient.decay.is_empty() {
        return Err(AppError::new(2, "Transient JSON holds no decay samples."));
    }
    Ok(transient)
}

/// Write a transient JSON file.
pub fn write_transient_json(path: &Path, transient: &TransientFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create transient JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, transient)
        .map_err(|e| AppError::new(2, format!("Failed to write transient JSON: {e}")))?;
    Ok(())
}
