//! Fit configuration aggregates.
//!
//! `GlobalFitParams` holds settings valid for a whole image and is read-only
//! while a batch runs. `FitInfo` is the per-request aggregate derived from it:
//! region, pixel, seed parameters and the cancellation token.

use serde::{Deserialize, Serialize};

use crate::domain::{
    BinRange, CancelToken, FitAlgorithm, FitFunction, FitRegion, NoiseModel, TransientWindow,
};
use crate::error::FitError;

/// Default reduced chi-square target.
pub const DEFAULT_CHI_SQUARE_TARGET: f64 = 1.5;

/// Settings shared by every fit of an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalFitParams {
    pub algorithm: FitAlgorithm,
    pub function: FitFunction,
    pub noise_model: NoiseModel,
    /// Bin width (ns).
    pub x_inc: f64,
    /// Instrument response samples; `None` fits a pure exponential.
    pub prompt: Option<Vec<f64>>,
    /// Part of the prompt used for convolution.
    pub prompt_window: BinRange,
    /// Baseline subtracted from the prompt before convolution.
    pub prompt_baseline: f64,
    /// Decay window.
    pub window: TransientWindow,
    pub chi_square_target: f64,
    /// Minimum photon count inside the window; below it a unit is skipped.
    pub threshold: f64,
    /// Free (`true`) or fixed (`false`) per parameter.
    pub free: Vec<bool>,
    /// Starting parameters; `None` means estimate from the data.
    pub parameters: Option<Vec<f64>>,
}

impl GlobalFitParams {
    /// Settings with every parameter free, no prompt and no threshold.
    pub fn new(function: FitFunction, x_inc: f64, window: TransientWindow) -> Self {
        Self {
            algorithm: FitAlgorithm::RldLma,
            function,
            noise_model: NoiseModel::PoissonData,
            x_inc,
            prompt: None,
            prompt_window: BinRange::new(0, 0),
            prompt_baseline: 0.0,
            window,
            chi_square_target: DEFAULT_CHI_SQUARE_TARGET,
            threshold: 0.0,
            free: vec![true; function.param_count()],
            parameters: None,
        }
    }

    /// Check the configuration against a histogram of `bins` bins.
    pub fn validate(&self, bins: usize) -> Result<(), FitError> {
        if !(self.x_inc.is_finite() && self.x_inc > 0.0) {
            return Err(FitError::InvalidInput(format!(
                "x_inc must be finite and > 0, got {}",
                self.x_inc
            )));
        }
        if self.free.len() != self.function.param_count() {
            return Err(FitError::InvalidInput(format!(
                "free mask has {} entries, {} expects {}",
                self.free.len(),
                self.function.display_name(),
                self.function.param_count()
            )));
        }
        if let Some(params) = &self.parameters {
            check_param_len(self.function, params)?;
        }
        if !(self.chi_square_target.is_finite() && self.chi_square_target > 0.0) {
            return Err(FitError::InvalidInput(format!(
                "chi-square target must be > 0, got {}",
                self.chi_square_target
            )));
        }
        validate_window(&self.window, bins)?;
        if let Some(prompt) = &self.prompt {
            if self.prompt_window.is_empty() || self.prompt_window.stop > prompt.len() {
                return Err(FitError::InvalidInput(format!(
                    "prompt window [{}, {}) does not fit a prompt of {} bins",
                    self.prompt_window.start,
                    self.prompt_window.stop,
                    prompt.len()
                )));
            }
        }
        Ok(())
    }
}

/// A single fit request (one pixel, one ROI, or a whole image).
#[derive(Debug, Clone)]
pub struct FitInfo {
    pub region: FitRegion,
    pub algorithm: FitAlgorithm,
    pub function: FitFunction,
    pub noise_model: NoiseModel,
    pub window: TransientWindow,
    pub threshold: f64,
    pub chi_square_target: f64,
    /// Pixel `(x, y)` for `FitRegion::Point`.
    pub pixel: Option<(usize, usize)>,
    /// Seed parameters; `None` means estimate from the data.
    pub parameters: Option<Vec<f64>>,
    pub free: Vec<bool>,
    /// Seed each pixel with its previous result (`FitRegion::Each`).
    pub refine_fit: bool,
    /// Per-bin sigma for `NoiseModel::Given` (full histogram length).
    pub sigma: Option<Vec<f64>>,
    pub cancel: CancelToken,
}

impl FitInfo {
    /// Derive a request from the image-wide settings.
    pub fn from_global(global: &GlobalFitParams, region: FitRegion) -> Self {
        Self {
            region,
            algorithm: global.algorithm,
            function: global.function,
            noise_model: global.noise_model,
            window: global.window,
            threshold: global.threshold,
            chi_square_target: global.chi_square_target,
            pixel: None,
            parameters: global.parameters.clone(),
            free: global.free.clone(),
            refine_fit: false,
            sigma: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_pixel(mut self, x: usize, y: usize) -> Self {
        self.pixel = Some((x, y));
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn parameter_count(&self) -> usize {
        self.function.param_count()
    }

    pub fn free_count(&self) -> usize {
        self.free.iter().filter(|f| **f).count()
    }

    /// Check the request against a histogram of `bins` bins.
    pub fn validate(&self, bins: usize) -> Result<(), FitError> {
        if self.free.len() != self.parameter_count() {
            return Err(FitError::InvalidInput(format!(
                "free mask has {} entries, {} expects {}",
                self.free.len(),
                self.function.display_name(),
                self.parameter_count()
            )));
        }
        if let Some(params) = &self.parameters {
            check_param_len(self.function, params)?;
            if params.iter().any(|v| !v.is_finite()) {
                return Err(FitError::InvalidInput("seed parameters must be finite".into()));
            }
        } else if self.free.iter().any(|f| !f) {
            return Err(FitError::InvalidInput(
                "fixed parameters need explicit seed values".into(),
            ));
        }
        if self.free_count() == 0 && self.algorithm != FitAlgorithm::Rld {
            return Err(FitError::InvalidInput("no free parameters to fit".into()));
        }
        validate_window(&self.window, bins)?;
        if self.window.fit_len() <= self.free_count() {
            return Err(FitError::InvalidInput(format!(
                "fit window of {} bins is too short for {} free parameters",
                self.window.fit_len(),
                self.free_count()
            )));
        }
        if self.noise_model == NoiseModel::Given {
            match &self.sigma {
                Some(sigma) if sigma.len() == bins => {
                    if sigma.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
                        return Err(FitError::InvalidInput("sigma values must be > 0".into()));
                    }
                }
                Some(sigma) => {
                    return Err(FitError::InvalidInput(format!(
                        "sigma has {} bins, transient has {bins}",
                        sigma.len()
                    )));
                }
                None => {
                    return Err(FitError::InvalidInput(
                        "noise model 'given' requires per-bin sigma".into(),
                    ));
                }
            }
        }
        if self.region == FitRegion::Point && self.pixel.is_none() {
            return Err(FitError::InvalidInput("point fit needs a pixel".into()));
        }
        Ok(())
    }
}

fn check_param_len(function: FitFunction, params: &[f64]) -> Result<(), FitError> {
    if params.len() != function.param_count() {
        return Err(FitError::InvalidInput(format!(
            "{} expects {} parameters, got {}",
            function.display_name(),
            function.param_count(),
            params.len()
        )));
    }
    Ok(())
}

fn validate_window(window: &TransientWindow, bins: usize) -> Result<(), FitError> {
    if window.transient_start > window.data_start
        || window.data_start >= window.transient_stop
        || window.transient_stop > bins
    {
        return Err(FitError::InvalidInput(format!(
            "invalid window start={} data={} stop={} for {bins} bins",
            window.transient_start, window.data_start, window.transient_stop
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_global_copies_shared_settings() {
        let mut global = GlobalFitParams::new(FitFunction::Double, 0.05, TransientWindow::new(2, 5, 60));
        global.threshold = 50.0;
        let info = FitInfo::from_global(&global, FitRegion::Each);
        assert_eq!(info.function, FitFunction::Double);
        assert_eq!(info.window, global.window);
        assert_eq!(info.threshold, 50.0);
        assert_eq!(info.free.len(), 5);
        assert!(!info.refine_fit);
    }

    #[test]
    fn validate_rejects_bad_window_and_x_inc() {
        let global = GlobalFitParams::new(FitFunction::Single, 0.0, TransientWindow::new(0, 0, 10));
        assert!(matches!(global.validate(10), Err(FitError::InvalidInput(_))));

        let global = GlobalFitParams::new(FitFunction::Single, 0.1, TransientWindow::new(0, 12, 10));
        assert!(global.validate(10).is_err());

        let global = GlobalFitParams::new(FitFunction::Single, 0.1, TransientWindow::new(0, 0, 20));
        assert!(global.validate(10).is_err());
        assert!(global.validate(20).is_ok());
    }

    #[test]
    fn fixed_parameters_require_seed() {
        let global = GlobalFitParams::new(FitFunction::Single, 0.1, TransientWindow::full(32));
        let mut info = FitInfo::from_global(&global, FitRegion::Summed);
        info.free = vec![true, false, true];
        assert!(info.validate(32).is_err());
        info.parameters = Some(vec![10.0, 2.0, 0.0]);
        assert!(info.validate(32).is_ok());
    }

    #[test]
    fn given_noise_needs_sigma_of_matching_length() {
        let mut global = GlobalFitParams::new(FitFunction::Single, 0.1, TransientWindow::full(16));
        global.noise_model = NoiseModel::Given;
        let mut info = FitInfo::from_global(&global, FitRegion::Summed);
        assert!(info.validate(16).is_err());
        info.sigma = Some(vec![1.0; 8]);
        assert!(info.validate(16).is_err());
        info.sigma = Some(vec![1.0; 16]);
        assert!(info.validate(16).is_ok());
    }
}
