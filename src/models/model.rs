//! Model evaluation for single / double / triple / stretched exponentials.
//!
//! The solvers rely on two primitive operations:
//! - predict the model over the fit window for a parameter vector
//! - fill the Jacobian columns of the *free* parameters only
//!
//! Without a prompt the exponential starts at `data_start`. With a prompt the
//! exponential starts at the first bin of the instrument response and is
//! convolved with it in absolute bins, `y[m] = Σ_k irf[k]·e(m - start - k)`;
//! the offset `C` is never convolved.

use nalgebra::DMatrix;

use crate::domain::{FitFunction, H_INDEX, TransientWindow};
use crate::math::{convolve_into, decay, decay_dtau, stretched, stretched_partials};

/// Unit-area instrument response and the histogram bin of its first sample.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentResponse {
    pub start: usize,
    pub samples: Vec<f64>,
}

/// Exponential decay model bound to one fit window.
#[derive(Debug, Clone)]
pub struct DecayModel {
    function: FitFunction,
    x_inc: f64,
    /// Grid length the exponential part is evaluated on.
    grid_len: usize,
    /// First grid index inside the fit window.
    offset: usize,
    /// Grid index where the exponential starts (`t = 0`).
    delay: usize,
    fit_len: usize,
    irf: Option<Vec<f64>>,
}

impl DecayModel {
    /// Model without instrument response; `t = 0` at `data_start`.
    pub fn new(function: FitFunction, x_inc: f64, window: &TransientWindow) -> Self {
        let fit_len = window.fit_len();
        Self {
            function,
            x_inc,
            grid_len: fit_len,
            offset: 0,
            delay: 0,
            fit_len,
            irf: None,
        }
    }

    /// Model convolved with an instrument response.
    ///
    /// The grid starts at `min(irf.start, transient_start)` so the whole rise
    /// of both curves is covered.
    pub fn with_irf(function: FitFunction, x_inc: f64, window: &TransientWindow, irf: InstrumentResponse) -> Self {
        let origin = irf.start.min(window.transient_start);
        Self {
            function,
            x_inc,
            grid_len: window.transient_stop - origin,
            offset: window.data_start - origin,
            delay: irf.start - origin,
            fit_len: window.fit_len(),
            irf: Some(irf.samples),
        }
    }

    pub fn function(&self) -> FitFunction {
        self.function
    }

    pub fn has_irf(&self) -> bool {
        self.irf.is_some()
    }

    /// Ratio between the amplitude `A` of a single exponential with lifetime
    /// `tau` and the model value it produces at `data_start`.
    ///
    /// Converts an amplitude measured on the data into a model amplitude.
    pub fn amplitude_scale(&self, tau: f64) -> f64 {
        let unit: Vec<f64> = (0..=self.offset).map(|k| self.delayed(k, |t| decay(t, tau))).collect();
        let at_start = self.convolved(unit)[self.offset];
        if at_start.is_finite() && at_start > 0.0 { 1.0 / at_start } else { 1.0 }
    }

    /// `f` at grid index `k`, or 0 before the exponential starts.
    fn delayed(&self, k: usize, f: impl Fn(f64) -> f64) -> f64 {
        if k < self.delay {
            return 0.0;
        }
        f((k - self.delay) as f64 * self.x_inc)
    }

    /// Predict the model over the fit window.
    pub fn predict(&self, params: &[f64], out: &mut [f64]) {
        let c = params[self.function.c_index()];
        let exp_part: Vec<f64> = (0..self.grid_len)
            .map(|k| self.delayed(k, |t| self.exponential_part(params, t)))
            .collect();
        let exp_part = self.convolved(exp_part);
        for (i, slot) in out.iter_mut().enumerate().take(self.fit_len) {
            *slot = exp_part[self.offset + i] + c;
        }
    }

    /// Predict the model and fill the Jacobian columns of `free` parameters.
    ///
    /// `jacobian` must be `fit_len × free.len()`; column `j` holds
    /// `∂f/∂p[free[j]]`.
    pub fn predict_with_jacobian(
        &self,
        params: &[f64],
        free: &[usize],
        values: &mut [f64],
        jacobian: &mut DMatrix<f64>,
    ) {
        self.predict(params, values);
        let c_index = self.function.c_index();
        for (col, &p) in free.iter().enumerate() {
            if p == c_index {
                jacobian.column_mut(col).fill(1.0);
                continue;
            }
            let raw: Vec<f64> = (0..self.grid_len)
                .map(|k| self.delayed(k, |t| self.partial(params, p, t)))
                .collect();
            let raw = self.convolved(raw);
            for i in 0..self.fit_len {
                jacobian[(i, col)] = raw[self.offset + i];
            }
        }
    }

    fn convolved(&self, signal: Vec<f64>) -> Vec<f64> {
        match &self.irf {
            Some(irf) => {
                let mut out = vec![0.0; signal.len()];
                convolve_into(irf, &signal, &mut out);
                out
            }
            None => signal,
        }
    }

    /// Model value without the offset at time `t`.
    fn exponential_part(&self, params: &[f64], t: f64) -> f64 {
        if self.function.is_stretched() {
            return params[0] * stretched(t, params[1], params[H_INDEX]);
        }
        (0..self.function.components())
            .map(|i| params[2 * i] * decay(t, params[2 * i + 1]))
            .sum()
    }

    /// `∂f/∂p[index]` of the exponential part at time `t`.
    fn partial(&self, params: &[f64], index: usize, t: f64) -> f64 {
        if self.function.is_stretched() {
            let (s, d_tau, d_h) = stretched_partials(t, params[1], params[H_INDEX]);
            return match index {
                0 => s,
                1 => params[0] * d_tau,
                H_INDEX => params[0] * d_h,
                _ => 0.0,
            };
        }
        if index % 2 == 0 {
            decay(t, params[index + 1])
        } else {
            params[index - 1] * decay_dtau(t, params[index])
        }
    }
}

/// Evaluate the model over `len` bins from `t = 0`, without instrument response.
pub fn predict_curve(function: FitFunction, params: &[f64], x_inc: f64, len: usize) -> Vec<f64> {
    let model = DecayModel::new(function, x_inc, &TransientWindow::full(len));
    let mut out = vec![0.0; len];
    model.predict(params, &mut out);
    out
}
