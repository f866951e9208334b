//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON for downstream image builders
//! - selected from the command line (`ValueEnum`)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Offset of the first amplitude in every exponential parameter vector.
pub const A1_INDEX: usize = 0;
/// Offset of the first lifetime.
pub const T1_INDEX: usize = 1;
/// Offset of the second amplitude (double / triple exponential).
pub const A2_INDEX: usize = 2;
/// Offset of the second lifetime (double / triple exponential).
pub const T2_INDEX: usize = 3;
/// Offset of the third amplitude (triple exponential).
pub const A3_INDEX: usize = 4;
/// Offset of the third lifetime (triple exponential).
pub const T3_INDEX: usize = 5;
/// Offset of the stretch exponent `H` (stretched exponential only).
pub const H_INDEX: usize = 2;

/// Which solver drives the fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FitAlgorithm {
    /// Rapid lifetime determination only (closed form, non-iterative).
    Rld,
    /// Levenberg–Marquardt seeded by the caller's parameters.
    ///
    /// Falls back to an RLD seed when the caller asks to estimate from data.
    Lma,
    /// Levenberg–Marquardt always seeded by RLD.
    RldLma,
}

impl FitAlgorithm {
    /// Name under which the algorithm is registered in the fitter registry.
    pub fn registry_name(self) -> &'static str {
        match self {
            FitAlgorithm::Rld => "rld",
            FitAlgorithm::Lma => "lma",
            FitAlgorithm::RldLma => "rld-lma",
        }
    }
}

/// Model function fitted to the transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FitFunction {
    /// `A·exp(-t/T) + C`
    Single,
    /// `A1·exp(-t/T1) + A2·exp(-t/T2) + C`
    Double,
    /// `A1·exp(-t/T1) + A2·exp(-t/T2) + A3·exp(-t/T3) + C`
    Triple,
    /// `A·exp(-(t/T)^(1/H)) + C`
    Stretched,
}

impl FitFunction {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            FitFunction::Single => "Single Exponential",
            FitFunction::Double => "Double Exponential",
            FitFunction::Triple => "Triple Exponential",
            FitFunction::Stretched => "Stretched Exponential",
        }
    }

    /// Number of exponential components (amplitude/lifetime pairs).
    pub fn components(self) -> usize {
        match self {
            FitFunction::Single | FitFunction::Stretched => 1,
            FitFunction::Double => 2,
            FitFunction::Triple => 3,
        }
    }

    /// Length of the parameter vector.
    pub fn param_count(self) -> usize {
        match self {
            FitFunction::Single => 3,
            FitFunction::Double => 5,
            FitFunction::Triple => 7,
            FitFunction::Stretched => 4,
        }
    }

    /// Offset of the constant background `C` (always the last element).
    pub fn c_index(self) -> usize {
        self.param_count() - 1
    }

    pub fn is_stretched(self) -> bool {
        self == FitFunction::Stretched
    }

    /// Short parameter labels in vector order.
    pub fn param_labels(self) -> &'static [&'static str] {
        match self {
            FitFunction::Single => &["A", "T", "C"],
            FitFunction::Double => &["A1", "T1", "A2", "T2", "C"],
            FitFunction::Triple => &["A1", "T1", "A2", "T2", "A3", "T3", "C"],
            FitFunction::Stretched => &["A", "T", "H", "C"],
        }
    }

    /// Build the function for a component count (1–3).
    pub fn from_components(components: usize) -> Option<Self> {
        match components {
            1 => Some(FitFunction::Single),
            2 => Some(FitFunction::Double),
            3 => Some(FitFunction::Triple),
            _ => None,
        }
    }
}

/// How each bin is weighted in the chi-square objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum NoiseModel {
    /// Uniform weights (`σ = 1`).
    Const,
    /// Per-bin sigma supplied by the caller.
    Given,
    /// Poisson noise estimated from the data: `σ² = max(y, 1)`.
    PoissonData,
    /// Poisson noise estimated from the model: `σ² = max(f(t), 1)`.
    PoissonFit,
}

/// Spatial unit(s) a fit request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FitRegion {
    /// Sum every pixel into one transient and fit it once.
    Summed,
    /// One summed fit per region of interest.
    Roi,
    /// Fit a single designated pixel.
    Point,
    /// Fit every pixel independently.
    Each,
}

/// Bin boundaries of the fitted transient.
///
/// The model starts at `transient_start` (where the excitation arrives when a
/// prompt is convolved); chi-square only covers `[data_start, transient_stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransientWindow {
    pub transient_start: usize,
    pub data_start: usize,
    pub transient_stop: usize,
}

impl TransientWindow {
    pub fn new(transient_start: usize, data_start: usize, transient_stop: usize) -> Self {
        Self {
            transient_start,
            data_start,
            transient_stop,
        }
    }

    /// Window covering a whole histogram of `bins` bins.
    pub fn full(bins: usize) -> Self {
        Self::new(0, 0, bins)
    }

    /// Number of bins that contribute to chi-square.
    pub fn fit_len(&self) -> usize {
        self.transient_stop.saturating_sub(self.data_start)
    }
}

/// Half-open bin range `[start, stop)` (used for the prompt window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinRange {
    pub start: usize,
    pub stop: usize,
}

impl BinRange {
    pub fn new(start: usize, stop: usize) -> Self {
        Self { start, stop }
    }

    pub fn len(&self) -> usize {
        self.stop.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cooperative cancellation flag shared between a caller and running fits.
///
/// Cloning shares the same flag. Writes use release ordering and reads use
/// acquire ordering, so a fit that observes the flag also observes everything
/// the cancelling thread wrote before it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// How an iterative fit terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitStatus {
    /// Tolerance met (or a closed-form estimate was requested).
    Converged,
    /// Iteration cap reached before the tolerance was met.
    IterationCap,
    /// No damping produced a downhill step before any tolerance was met.
    Stalled,
    /// The cancellation flag was observed at an iteration boundary.
    Cancelled,
}

/// Fit output for a single transient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub function: FitFunction,
    /// Full parameter vector, fixed entries included unchanged.
    pub parameters: Vec<f64>,
    /// Model samples over `[data_start, transient_stop)`.
    pub fitted: Vec<f64>,
    /// `observed - fitted` over the same window.
    pub residuals: Vec<f64>,
    pub chi_square: f64,
    /// `chi_square / (n - free)`.
    pub reduced_chi_square: f64,
    pub iterations: usize,
    pub status: FitStatus,
}

impl FitResult {
    pub fn converged(&self) -> bool {
        self.status == FitStatus::Converged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_index_is_last_parameter() {
        for function in [
            FitFunction::Single,
            FitFunction::Double,
            FitFunction::Triple,
            FitFunction::Stretched,
        ] {
            assert_eq!(function.c_index(), function.param_labels().len() - 1);
            assert_eq!(function.param_labels()[function.c_index()], "C");
        }
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        clone.reset();
        assert!(!token.is_cancelled());
    }
}
