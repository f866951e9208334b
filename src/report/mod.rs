//! Reporting utilities: per-parameter statistics and formatted terminal output.

use crate::fit::FitReport;
use crate::images::mean_lifetime;

pub mod format;

pub use format::*;

/// Spread of one quantity over the fitted units of a report.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterStats {
    pub label: String,
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl ParameterStats {
    fn from_values(label: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let (mut count, mut sum, mut min, mut max) = (0usize, 0.0, f64::INFINITY, f64::NEG_INFINITY);
        for v in values.into_iter().filter(|v| v.is_finite()) {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        (count > 0).then(|| Self {
            label: label.into(),
            count,
            mean: sum / count as f64,
            min,
            max,
        })
    }
}

/// Statistics for every parameter, the mean lifetime and the reduced
/// chi-square over fitted (or unconverged) units.
pub fn parameter_stats(report: &FitReport) -> Vec<ParameterStats> {
    let results: Vec<_> = report.units.iter().filter_map(|u| u.outcome.result()).collect();
    let components = report.function.components();

    let mut out: Vec<ParameterStats> = report
        .function
        .param_labels()
        .iter()
        .enumerate()
        .filter_map(|(i, label)| ParameterStats::from_values(*label, results.iter().map(|r| r.parameters[i])))
        .collect();
    if components > 1 {
        out.extend(ParameterStats::from_values(
            "T_mean",
            results.iter().map(|r| mean_lifetime(&r.parameters, components)),
        ));
    }
    out.extend(ParameterStats::from_values(
        "chi2_red",
        results.iter().map(|r| r.reduced_chi_square),
    ));
    out
}
