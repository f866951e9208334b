//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays clean and testable
//! - output changes are localized

use crate::domain::{FitResult, GlobalFitParams};
use crate::fit::{FitOutcome, FitReport, FitUnit};
use crate::heuristics::{CursorEstimate, CursorStatus};
use crate::report::parameter_stats;

/// Format the cursor estimate with bin indices and times.
pub fn format_cursor_summary(estimate: &CursorEstimate, x_inc: f64) -> String {
    let mut out = String::new();
    out.push_str("=== flim - cursor estimate ===\n");
    let status = match estimate.status {
        CursorStatus::Converged => "converged",
        CursorStatus::Unconverged => "unconverged (best chi-square start)",
        CursorStatus::NoSignal => "no usable signal",
    };
    out.push_str(&format!("Status: {status}\n"));
    out.push_str(&format!(
        "Prompt : [{}, {}) baseline={:.4}\n",
        estimate.prompt_start, estimate.prompt_stop, estimate.prompt_baseline
    ));
    for (label, bin) in [
        ("transient start", estimate.transient_start),
        ("data start", estimate.data_start),
        ("transient stop", estimate.transient_stop),
    ] {
        out.push_str(&format!("{label:<16} bin {bin:>5}  ({:.3} ns)\n", bin as f64 * x_inc));
    }
    if let Some(chi) = estimate.trial_chi_square {
        out.push_str(&format!("Trial fit reduced chi2: {chi:.4}\n"));
    }
    out
}

/// Format the run settings and the fit outcome.
pub fn format_fit_report(report: &FitReport, global: &GlobalFitParams) -> String {
    let mut out = String::new();

    out.push_str("=== flim - lifetime fit ===\n");
    out.push_str(&format!(
        "Model: {} | algorithm: {:?} | noise: {:?} | region: {:?}\n",
        global.function.display_name(),
        global.algorithm,
        global.noise_model,
        report.region
    ));
    out.push_str(&format!(
        "Window: [{}, {}, {}) | x_inc={} ns | prompt: {}\n",
        global.window.transient_start,
        global.window.data_start,
        global.window.transient_stop,
        global.x_inc,
        if global.prompt.is_some() { "yes" } else { "no" }
    ));

    let s = &report.summary;
    out.push_str(&format!(
        "Units: {} fitted, {} unconverged, {} skipped, {} failed, {} cancelled\n",
        s.fitted, s.unconverged, s.skipped, s.failed, s.cancelled
    ));

    if report.units.len() <= 4 {
        for unit in &report.units {
            out.push('\n');
            out.push_str(&format!("{}:\n", unit_label(unit.unit)));
            match &unit.outcome {
                FitOutcome::Fitted(result) | FitOutcome::Unconverged(result) => {
                    out.push_str(&format_fit_result(result));
                }
                FitOutcome::Skipped { photons } => {
                    out.push_str(&format!("  skipped ({photons:.0} photons below threshold)\n"));
                }
                FitOutcome::Failed { reason } => out.push_str(&format!("  failed: {reason}\n")),
                FitOutcome::Cancelled => out.push_str("  cancelled\n"),
            }
        }
        return out;
    }

    out.push('\n');
    out.push_str(&format!("{:<10} {:>8} {:>12} {:>12} {:>12}\n", "param", "n", "mean", "min", "max"));
    out.push_str(&format!("{:-<10} {:-<8} {:-<12} {:-<12} {:-<12}\n", "", "", "", "", ""));
    for stats in parameter_stats(report) {
        out.push_str(&format!(
            "{:<10} {:>8} {:>12.4} {:>12.4} {:>12.4}\n",
            stats.label, stats.count, stats.mean, stats.min, stats.max
        ));
    }
    out
}

/// Format one fit: labelled parameters and goodness of fit.
pub fn format_fit_result(result: &FitResult) -> String {
    let mut out = String::new();
    for (label, value) in result.function.param_labels().iter().zip(&result.parameters) {
        out.push_str(&format!("  {label:<3} = {value:.6}\n"));
    }
    out.push_str(&format!(
        "  chi2 = {:.4} (reduced {:.4}) | iterations: {} | {:?}\n",
        result.chi_square, result.reduced_chi_square, result.iterations, result.status
    ));
    out
}

fn unit_label(unit: FitUnit) -> String {
    match unit {
        FitUnit::Summed => "Summed image".to_string(),
        FitUnit::Roi(label) => format!("ROI {label}"),
        FitUnit::Pixel { x, y } => format!("Pixel ({x}, {y})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitFunction, FitStatus};

    #[test]
    fn fit_result_lists_labelled_parameters() {
        let result = FitResult {
            function: FitFunction::Single,
            parameters: vec![1000.0, 2.5, 3.0],
            fitted: Vec::new(),
            residuals: Vec::new(),
            chi_square: 210.0,
            reduced_chi_square: 1.05,
            iterations: 7,
            status: FitStatus::Converged,
        };
        let text = format_fit_result(&result);
        assert!(text.contains("T   = 2.500000"));
        assert!(text.contains("reduced 1.0500"));
    }

    #[test]
    fn cursor_summary_reports_times() {
        let estimate = CursorEstimate {
            prompt_start: 27,
            prompt_stop: 90,
            prompt_baseline: 2.5,
            transient_start: 27,
            data_start: 37,
            transient_stop: 230,
            trial_chi_square: Some(1.1),
            status: CursorStatus::Converged,
        };
        let text = format_cursor_summary(&estimate, 0.05);
        assert!(text.contains("data start       bin    37  (1.850 ns)"));
    }
}
