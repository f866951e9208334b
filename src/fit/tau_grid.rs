//! Lifetime grid generation.
//!
//! Multi-exponential seeds come from a deterministic grid search over lifetime
//! tuples around the single-exponential RLD lifetime.
//!
//! Why grid search?
//! - RLD only has a closed form for one component.
//! - It is deterministic given the same inputs.
//! - With at most three lifetimes, a modest grid is fast enough per pixel.

use crate::error::FitError;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, FitError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(FitError::InvalidInput(format!(
            "invalid lifetime range: min={min}, max={max} (must be finite, >0, and max>min)"
        )));
    }
    if steps < 2 {
        return Err(FitError::InvalidInput("lifetime grid needs >= 2 steps".into()));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    Ok((0..steps).map(|i| (ln_min + step * i as f64).exp()).collect())
}

/// Lifetime tuples for `components` lifetimes, each at least `min_ratio`
/// times the previous one (`τ1 > τ2 > τ3`).
pub fn lifetime_grid(
    components: usize,
    min: f64,
    max: f64,
    steps: usize,
    min_ratio: f64,
) -> Result<Vec<Vec<f64>>, FitError> {
    let values = log_space(min, max, steps)?;
    let min_ratio = min_ratio.max(1.0);
    let mut out = Vec::new();
    match components {
        1 => out.extend(values.iter().rev().map(|&t| vec![t])),
        2 => {
            for i in (0..values.len()).rev() {
                for j in (0..i).rev() {
                    if values[i] >= values[j] * min_ratio {
                        out.push(vec![values[i], values[j]]);
                    }
                }
            }
        }
        3 => {
            for i in (0..values.len()).rev() {
                for j in (0..i).rev() {
                    for k in (0..j).rev() {
                        if values[i] >= values[j] * min_ratio && values[j] >= values[k] * min_ratio {
                            out.push(vec![values[i], values[j], values[k]]);
                        }
                    }
                }
            }
        }
        n => {
            return Err(FitError::InvalidInput(format!(
                "lifetime grid supports 1-3 components, got {n}"
            )));
        }
    }
    Ok(out)
}
