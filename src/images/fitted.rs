//! Per-pixel value images built from an `Each` fit report.

use serde::{Deserialize, Serialize};

use crate::error::FitError;
use crate::fit::{FitReport, FitUnit};
use crate::images::values::{fractional_intensity, mean_lifetime};

/// Scalar extracted from each pixel's fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FittedValue {
    /// Raw parameter at this index of the parameter vector.
    Parameter(usize),
    ChiSquare,
    /// Fraction of the given component.
    FractionalIntensity(usize),
    MeanLifetime,
}

impl FittedValue {
    /// Value for one parameter vector and reduced chi-square.
    pub fn evaluate(self, params: &[f64], components: usize, reduced_chi_square: f64) -> f64 {
        match self {
            FittedValue::Parameter(index) => params.get(index).copied().unwrap_or(f64::NAN),
            FittedValue::ChiSquare => reduced_chi_square,
            FittedValue::FractionalIntensity(component) => {
                fractional_intensity(params, component, components)
            }
            FittedValue::MeanLifetime => mean_lifetime(params, components),
        }
    }

    pub fn label(self) -> String {
        match self {
            FittedValue::Parameter(index) => format!("parameter {index}"),
            FittedValue::ChiSquare => "reduced chi-square".to_string(),
            FittedValue::FractionalIntensity(component) => {
                format!("fractional intensity {}", component + 1)
            }
            FittedValue::MeanLifetime => "mean lifetime".to_string(),
        }
    }
}

/// Row-major `width × height` image of `value`.
///
/// Pixels that were skipped, failed, cancelled or are absent from the report
/// hold `NaN`.
pub fn fitted_value_image(
    report: &FitReport,
    width: usize,
    height: usize,
    value: FittedValue,
) -> Result<Vec<f64>, FitError> {
    let components = report.function.components();
    let mut image = vec![f64::NAN; width * height];
    for unit in &report.units {
        let FitUnit::Pixel { x, y } = unit.unit else {
            continue;
        };
        if x >= width || y >= height {
            return Err(FitError::InvalidInput(format!(
                "pixel ({x}, {y}) outside {width}x{height} image"
            )));
        }
        if let Some(result) = unit.outcome.result() {
            image[y * width + x] = value.evaluate(&result.parameters, components, result.reduced_chi_square);
        }
    }
    Ok(image)
}
