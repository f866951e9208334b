//! Cursor estimation: default fit and prompt windows from the curves alone.
//!
//! The estimator looks for three features of each curve:
//!
//! - the peak (first maximum)
//! - the rising edge before it (steepest single-bin rise, extended back while
//!   the curve stays above baseline)
//! - the baseline (mean of the second half of the post-peak tail)
//!
//! The decay's data start is then validated with trial single-exponential fits
//! against the chi-square target.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::domain::{BinRange, CancelToken, FitFunction, NoiseModel, TransientWindow};
use crate::error::FitError;
use crate::fit::{FitProblem, SolverConfig, estimate_parameters, minimize};

/// Prompt stop: first bin after the peak at this fraction of the peak height.
pub const PROMPT_STOP_FRACTION: f64 = 0.1;
/// Transient stop as a fraction of the histogram length.
pub const TRANSIENT_STOP_FRACTION: f64 = 0.9;
/// Maximum number of data-start bins tried.
pub const MAX_START_ATTEMPTS: usize = 20;
/// Fewest bins a trial fit may cover.
pub const MIN_TRIAL_BINS: usize = 10;
/// Signal must exceed baseline by this many Poisson sigmas.
pub const SIGNAL_SIGMAS: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CursorStatus {
    /// A data start meeting the chi-square target was found.
    Converged,
    /// No start met the target; the lowest chi-square start is returned.
    Unconverged,
    /// The decay holds no usable signal; cursors span the whole histogram.
    NoSignal,
}

/// Proposed prompt and decay windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorEstimate {
    pub prompt_start: usize,
    pub prompt_stop: usize,
    pub prompt_baseline: f64,
    pub transient_start: usize,
    pub data_start: usize,
    pub transient_stop: usize,
    /// Reduced chi-square of the trial fit at `data_start`.
    pub trial_chi_square: Option<f64>,
    pub status: CursorStatus,
}

impl CursorEstimate {
    /// `[prompt_start, prompt_stop, prompt_baseline, transient_start,
    /// data_start, transient_stop]`.
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.prompt_start as f64,
            self.prompt_stop as f64,
            self.prompt_baseline,
            self.transient_start as f64,
            self.data_start as f64,
            self.transient_stop as f64,
        ]
    }

    pub fn window(&self) -> TransientWindow {
        TransientWindow::new(self.transient_start, self.data_start, self.transient_stop)
    }

    pub fn prompt_window(&self) -> BinRange {
        BinRange::new(self.prompt_start, self.prompt_stop)
    }
}

/// Decay-only cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecayCursors {
    pub start: usize,
    pub stop: usize,
    pub status: CursorStatus,
}

/// Cursors for a decay without prompt: from the peak to 90% of the histogram.
pub fn estimate_decay_cursors(x_inc: f64, decay: &[f64]) -> Result<DecayCursors, FitError> {
    check_input(x_inc, decay)?;
    let n = decay.len();
    let features = CurveFeatures::of(decay);
    if !features.has_signal() {
        debug!("decay cursors: no signal above baseline {:.3}", features.baseline);
        return Ok(DecayCursors {
            start: 0,
            stop: n,
            status: CursorStatus::NoSignal,
        });
    }
    let start = features.peak;
    Ok(DecayCursors {
        start,
        stop: transient_stop(n, start),
        status: CursorStatus::Converged,
    })
}

/// Estimate prompt and decay cursors.
///
/// Without a prompt the prompt fields are zero and the decay drives the
/// estimate alone.
pub fn estimate_cursors(
    x_inc: f64,
    prompt: Option<&[f64]>,
    decay: &[f64],
    chi_square_target: f64,
) -> Result<CursorEstimate, FitError> {
    check_input(x_inc, decay)?;
    if !(chi_square_target.is_finite() && chi_square_target > 0.0) {
        return Err(FitError::InvalidInput(format!(
            "chi-square target must be > 0, got {chi_square_target}"
        )));
    }
    let n = decay.len();
    if let Some(prompt) = prompt {
        if prompt.len() != n {
            return Err(FitError::InvalidInput(format!(
                "prompt has {} bins, decay has {n}",
                prompt.len()
            )));
        }
        if prompt.iter().any(|v| !v.is_finite()) {
            return Err(FitError::InvalidInput("prompt contains non-finite values".into()));
        }
    }

    let (prompt_start, prompt_stop, prompt_baseline) = prompt.map_or((0, 0, 0.0), prompt_cursors);

    let decay_features = CurveFeatures::of(decay);
    if !decay_features.has_signal() {
        debug!("cursors: decay has no signal above baseline {:.3}", decay_features.baseline);
        return Ok(CursorEstimate {
            prompt_start,
            prompt_stop,
            prompt_baseline,
            transient_start: 0,
            data_start: 0,
            transient_stop: n,
            trial_chi_square: None,
            status: CursorStatus::NoSignal,
        });
    }

    let transient_start = decay_features.rising_edge(decay);
    let candidate = decay_features.peak.saturating_sub(1).max(transient_start);
    let stop = transient_stop(n, candidate);

    let mut best: Option<(usize, f64)> = None;
    for start in (candidate..).take(MAX_START_ATTEMPTS) {
        if start + MIN_TRIAL_BINS > stop {
            break;
        }
        let Some(chi) = trial_reduced_chi_square(x_inc, &decay[start..stop]) else {
            continue;
        };
        debug!("cursors: trial fit from bin {start}: reduced chi2 {chi:.4}");
        if chi <= chi_square_target {
            return Ok(CursorEstimate {
                prompt_start,
                prompt_stop,
                prompt_baseline,
                transient_start,
                data_start: start,
                transient_stop: stop,
                trial_chi_square: Some(chi),
                status: CursorStatus::Converged,
            });
        }
        if best.is_none_or(|(_, b)| chi < b) {
            best = Some((start, chi));
        }
    }

    let (data_start, trial_chi_square) = match best {
        Some((start, chi)) => (start, Some(chi)),
        None => (candidate, None),
    };
    debug!("cursors: no start met chi2 target {chi_square_target}, using bin {data_start}");
    Ok(CursorEstimate {
        prompt_start,
        prompt_stop,
        prompt_baseline,
        transient_start,
        data_start,
        transient_stop: stop,
        trial_chi_square,
        status: CursorStatus::Unconverged,
    })
}

/// `(start, stop, baseline)` of the prompt; all zero when it holds no signal.
fn prompt_cursors(prompt: &[f64]) -> (usize, usize, f64) {
    let features = CurveFeatures::of(prompt);
    if !features.has_signal() {
        debug!("cursors: prompt has no signal above baseline {:.3}", features.baseline);
        return (0, 0, 0.0);
    }
    let level = features.baseline + PROMPT_STOP_FRACTION * (features.peak_value - features.baseline);
    let stop = (features.peak + 1..prompt.len())
        .find(|&i| prompt[i] <= level)
        .unwrap_or(prompt.len());
    (features.rising_edge(prompt), stop, features.baseline)
}

fn check_input(x_inc: f64, decay: &[f64]) -> Result<(), FitError> {
    if decay.is_empty() {
        return Err(FitError::InvalidInput("decay is empty".into()));
    }
    if !(x_inc.is_finite() && x_inc > 0.0) {
        return Err(FitError::InvalidInput(format!("x_inc must be finite and > 0, got {x_inc}")));
    }
    if decay.iter().any(|v| !v.is_finite()) {
        return Err(FitError::InvalidInput("decay contains non-finite values".into()));
    }
    Ok(())
}

/// `floor(0.9·n)`, but always past `start`.
fn transient_stop(n: usize, start: usize) -> usize {
    let stop = (TRANSIENT_STOP_FRACTION * n as f64).floor() as usize;
    stop.max(start + 1).min(n)
}

/// Single exponential (RLD seed + LMA, Poisson data weights) over `data`.
fn trial_reduced_chi_square(x_inc: f64, data: &[f64]) -> Option<f64> {
    let problem = FitProblem::from_window(FitFunction::Single, NoiseModel::PoissonData, x_inc, data);
    let free = [true; 3];
    let seed = estimate_parameters(&problem, None, &free);
    let result = match minimize(&problem, &seed, &free, &SolverConfig::default(), &CancelToken::new()) {
        Ok(result) => result,
        Err(FitError::ConvergenceFailure { best, .. }) => *best,
        Err(_) => return None,
    };
    result.reduced_chi_square.is_finite().then_some(result.reduced_chi_square)
}

struct CurveFeatures {
    peak: usize,
    peak_value: f64,
    baseline: f64,
}

impl CurveFeatures {
    fn of(curve: &[f64]) -> Self {
        let mut peak = 0;
        for (i, &v) in curve.iter().enumerate() {
            if v > curve[peak] {
                peak = i;
            }
        }
        let n = curve.len();
        let tail = &curve[peak + (n - peak) / 2..];
        let baseline = tail.iter().sum::<f64>() / tail.len() as f64;
        Self {
            peak,
            peak_value: curve[peak],
            baseline,
        }
    }

    fn has_signal(&self) -> bool {
        self.peak_value > self.baseline + SIGNAL_SIGMAS * self.baseline.max(1.0).sqrt()
    }

    /// Start of the rising edge leading to the peak.
    fn rising_edge(&self, curve: &[f64]) -> usize {
        let mut start = 0;
        let mut steepest = f64::NEG_INFINITY;
        for i in 1..=self.peak {
            let rise = curve[i] - curve[i - 1];
            if rise > steepest {
                steepest = rise;
                start = i;
            }
        }
        while start > 0 && curve[start - 1] > self.baseline {
            start -= 1;
        }
        start
    }
}
