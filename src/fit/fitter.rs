//! Low-level fitting routines for a single transient.
//!
//! Given:
//! - observed counts over the fit window `[data_start, transient_stop)`
//! - per-bin weights from the noise model
//! - a `DecayModel` (optionally convolved with the instrument response)
//!
//! a `CurveFitter` turns a seed parameter vector and a free/fixed mask into a
//! `FitResult`. Implementations are looked up by name in the
//! [`FitterRegistry`](crate::fit::FitterRegistry).

use crate::domain::{
    CancelToken, FitFunction, FitInfo, FitResult, FitStatus, H_INDEX, NoiseModel,
};
use crate::error::FitError;
use crate::fit::lma::{SolverConfig, minimize};
use crate::fit::rld::estimate_parameters;
use crate::models::{DecayModel, InstrumentResponse};

/// One prepared transient: observed data, weights and model.
#[derive(Debug, Clone)]
pub struct FitProblem {
    pub model: DecayModel,
    pub observed: Vec<f64>,
    pub noise_model: NoiseModel,
    /// Weights for noise models that do not depend on the fit.
    weights: Vec<f64>,
    pub x_inc: f64,
}

impl FitProblem {
    /// Prepare a transient for fitting.
    ///
    /// Fails with `DegenerateInput` when the window holds no photons or fewer
    /// than the request's threshold.
    pub fn build(
        info: &FitInfo,
        x_inc: f64,
        irf: Option<&InstrumentResponse>,
        transient: &[f64],
    ) -> Result<Self, FitError> {
        info.validate(transient.len())?;
        let window = info.window;
        let observed = transient[window.data_start..window.transient_stop].to_vec();
        if observed.iter().any(|v| !v.is_finite()) {
            return Err(FitError::InvalidInput("transient contains non-finite counts".into()));
        }

        let photons: f64 = observed.iter().sum();
        if photons <= 0.0 || photons < info.threshold {
            return Err(FitError::DegenerateInput {
                photons,
                threshold: info.threshold,
            });
        }

        let weights = match info.noise_model {
            NoiseModel::Const | NoiseModel::PoissonFit => vec![1.0; observed.len()],
            NoiseModel::PoissonData => observed.iter().map(|&y| 1.0 / y.max(1.0)).collect(),
            NoiseModel::Given => {
                // Presence and length are checked by `FitInfo::validate`.
                let sigma = info.sigma.as_deref().unwrap_or(&[]);
                sigma[window.data_start..window.transient_stop]
                    .iter()
                    .map(|s| 1.0 / (s * s))
                    .collect()
            }
        };

        let model = match irf {
            Some(irf) => DecayModel::with_irf(info.function, x_inc, &window, irf.clone()),
            None => DecayModel::new(info.function, x_inc, &window),
        };

        Ok(Self {
            model,
            observed,
            noise_model: info.noise_model,
            weights,
            x_inc,
        })
    }

    /// Prepare a bare transient window (no prompt, all bins used).
    pub fn from_window(function: FitFunction, noise_model: NoiseModel, x_inc: f64, data: &[f64]) -> Self {
        let window = crate::domain::TransientWindow::full(data.len());
        let weights = match noise_model {
            NoiseModel::PoissonData => data.iter().map(|&y| 1.0 / y.max(1.0)).collect(),
            _ => vec![1.0; data.len()],
        };
        Self {
            model: DecayModel::new(function, x_inc, &window),
            observed: data.to_vec(),
            noise_model,
            weights,
            x_inc,
        }
    }

    pub fn function(&self) -> FitFunction {
        self.model.function()
    }

    pub fn len(&self) -> usize {
        self.observed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }

    /// Weight of bin `i` given the current model value there.
    pub fn weight(&self, i: usize, fitted: f64) -> f64 {
        match self.noise_model {
            NoiseModel::PoissonFit => 1.0 / fitted.max(1.0),
            _ => self.weights[i],
        }
    }

    /// Weights usable before a model exists (Poisson-fit falls back to the data).
    pub fn seed_weights(&self) -> Vec<f64> {
        match self.noise_model {
            NoiseModel::PoissonFit => self.observed.iter().map(|&y| 1.0 / y.max(1.0)).collect(),
            _ => self.weights.clone(),
        }
    }

    /// Model curve and chi-square for a parameter vector.
    pub fn evaluate(&self, params: &[f64]) -> (Vec<f64>, f64) {
        let mut fitted = vec![0.0; self.len()];
        self.model.predict(params, &mut fitted);
        let chi_square = self.chi_square(&fitted);
        (fitted, chi_square)
    }

    /// Weighted sum of squared residuals over the fit window.
    pub fn chi_square(&self, fitted: &[f64]) -> f64 {
        self.observed
            .iter()
            .zip(fitted)
            .enumerate()
            .map(|(i, (&y, &f))| {
                let r = y - f;
                self.weight(i, f) * r * r
            })
            .sum()
    }

    /// Package a parameter vector as a `FitResult`.
    pub fn result(&self, params: Vec<f64>, free_count: usize, iterations: usize, status: FitStatus) -> FitResult {
        let (fitted, chi_square) = self.evaluate(&params);
        let residuals = self.observed.iter().zip(&fitted).map(|(y, f)| y - f).collect();
        let dof = self.len().saturating_sub(free_count).max(1);
        FitResult {
            function: self.function(),
            parameters: params,
            fitted,
            residuals,
            chi_square,
            reduced_chi_square: chi_square / dof as f64,
            iterations,
            status,
        }
    }
}

/// Whether lifetimes (and the stretch exponent) are usable.
pub fn admissible(function: FitFunction, params: &[f64]) -> bool {
    if params.iter().any(|v| !v.is_finite()) {
        return false;
    }
    if function.is_stretched() {
        return params[1] > 0.0 && params[H_INDEX] > 0.0;
    }
    (0..function.components()).all(|i| params[2 * i + 1] > 0.0)
}

/// A fitting algorithm over a prepared problem.
pub trait CurveFitter: Send + Sync {
    /// Registry name.
    fn name(&self) -> &'static str;

    /// Fit `problem` starting from `initial` (or an estimate from the data when
    /// `None`). Entries of `initial` whose `free` flag is false are returned
    /// unchanged.
    fn fit(
        &self,
        problem: &FitProblem,
        initial: Option<&[f64]>,
        free: &[bool],
        cancel: &CancelToken,
    ) -> Result<FitResult, FitError>;
}

/// Closed-form rapid lifetime determination.
#[derive(Debug, Clone, Default)]
pub struct RldFitter;

impl CurveFitter for RldFitter {
    fn name(&self) -> &'static str {
        "rld"
    }

    fn fit(
        &self,
        problem: &FitProblem,
        initial: Option<&[f64]>,
        free: &[bool],
        cancel: &CancelToken,
    ) -> Result<FitResult, FitError> {
        if cancel.is_cancelled() {
            return Err(FitError::Cancelled { partial: None });
        }
        let params = estimate_parameters(problem, initial, free);
        let free_count = free.iter().filter(|f| **f).count();
        Ok(problem.result(params, free_count, 0, FitStatus::Converged))
    }
}

/// Levenberg–Marquardt refinement.
#[derive(Debug, Clone, Default)]
pub struct LmaFitter {
    pub config: SolverConfig,
    /// Always start from the RLD estimate, ignoring free seed values.
    pub seed_from_rld: bool,
}

impl CurveFitter for LmaFitter {
    fn name(&self) -> &'static str {
        if self.seed_from_rld { "rld-lma" } else { "lma" }
    }

    fn fit(
        &self,
        problem: &FitProblem,
        initial: Option<&[f64]>,
        free: &[bool],
        cancel: &CancelToken,
    ) -> Result<FitResult, FitError> {
        let seed = match initial {
            Some(values) if !self.seed_from_rld && admissible(problem.function(), values) => {
                values.to_vec()
            }
            _ => estimate_parameters(problem, initial, free),
        };
        minimize(problem, &seed, free, &self.config, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitRegion, GlobalFitParams, TransientWindow};
    use crate::models::predict_curve;

    fn info(function: FitFunction, bins: usize) -> FitInfo {
        let global = GlobalFitParams::new(function, 0.05, TransientWindow::full(bins));
        FitInfo::from_global(&global, FitRegion::Summed)
    }

    #[test]
    fn build_rejects_empty_window() {
        let data = vec![0.0; 64];
        let err = FitProblem::build(&info(FitFunction::Single, 64), 0.05, None, &data).unwrap_err();
        assert!(matches!(err, FitError::DegenerateInput { photons, .. } if photons == 0.0));
    }

    #[test]
    fn build_applies_threshold() {
        let data = vec![1.0; 64];
        let mut request = info(FitFunction::Single, 64);
        request.threshold = 100.0;
        assert!(matches!(
            FitProblem::build(&request, 0.05, None, &data),
            Err(FitError::DegenerateInput { .. })
        ));
        request.threshold = 64.0;
        assert!(FitProblem::build(&request, 0.05, None, &data).is_ok());
    }

    #[test]
    fn chi_square_only_covers_the_window() {
        let mut data = predict_curve(FitFunction::Single, &[100.0, 1.0, 2.0], 0.05, 64);
        // Garbage outside the window must not matter.
        data[0] = 1e6;
        data[63] = 1e6;
        let mut request = info(FitFunction::Single, 64);
        request.window = TransientWindow::new(0, 1, 63);
        request.noise_model = NoiseModel::Const;
        let problem = FitProblem::build(&request, 0.05, None, &data).unwrap();
        assert_eq!(problem.len(), 62);

        // The model starts at data_start, so shift the amplitude by one bin.
        let a = 100.0 * (-0.05f64).exp();
        let (_, chi) = problem.evaluate(&[a, 1.0, 2.0]);
        assert!(chi < 1e-18, "chi={chi}");
    }

    #[test]
    fn admissible_rejects_non_positive_lifetimes() {
        assert!(admissible(FitFunction::Double, &[1.0, 2.0, 1.0, 0.5, 0.0]));
        assert!(!admissible(FitFunction::Double, &[1.0, 2.0, 1.0, -0.5, 0.0]));
        assert!(!admissible(FitFunction::Stretched, &[1.0, 2.0, 0.0, 0.0]));
        assert!(!admissible(FitFunction::Single, &[f64::NAN, 2.0, 0.0]));
    }
}
