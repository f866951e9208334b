//! Rules of thumb for default fit settings.

use crate::domain::{
    DEFAULT_CHI_SQUARE_TARGET, FitFunction, GlobalFitParams, TransientWindow,
};

/// Source of default settings for a new fit.
pub trait Estimator {
    /// Default first bin of the fit window.
    fn start(&self, bins: usize) -> usize;

    /// Default end (exclusive) of the fit window.
    fn stop(&self, bins: usize) -> usize;

    /// Minimum photon count for a pixel to be fitted.
    fn threshold(&self) -> f64;

    fn chi_square_target(&self) -> f64;

    /// Starting parameter vector for `function`.
    fn parameters(&self, function: FitFunction) -> Vec<f64>;

    /// Image-wide settings built from the rules above.
    fn global_params(&self, function: FitFunction, x_inc: f64, bins: usize) -> GlobalFitParams {
        let start = self.start(bins);
        let window = TransientWindow::new(start, start, self.stop(bins));
        let mut global = GlobalFitParams::new(function, x_inc, window);
        global.threshold = self.threshold();
        global.chi_square_target = self.chi_square_target();
        global
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEstimator;

impl Estimator for DefaultEstimator {
    fn start(&self, _bins: usize) -> usize {
        0
    }

    fn stop(&self, bins: usize) -> usize {
        bins
    }

    fn threshold(&self) -> f64 {
        100.0
    }

    fn chi_square_target(&self) -> f64 {
        DEFAULT_CHI_SQUARE_TARGET
    }

    fn parameters(&self, function: FitFunction) -> Vec<f64> {
        match function {
            FitFunction::Single => vec![1000.0, 2.5, 0.0],
            FitFunction::Double => vec![750.0, 2.5, 250.0, 0.5, 0.0],
            FitFunction::Triple => vec![500.0, 2.5, 300.0, 1.0, 200.0, 0.25, 0.0],
            FitFunction::Stretched => vec![1000.0, 2.5, 1.0, 0.0],
        }
    }
}
