//! Rapid lifetime determination (RLD) and seed estimation.
//!
//! RLD is a closed-form single-exponential estimate from block sums of the
//! transient. For `n` bins split into three blocks of `k = n / 3` bins with
//! sums `S0, S1, S2`, an exact `A·r^i + C` sequence satisfies:
//!
//! - `q = r^k = (S1 - S2) / (S0 - S1)`
//! - `T = -k·Δt / ln q`
//! - `A = (S0 - S1) / (G·(1 - q))` with `G = Σ_{i<k} r^i`
//! - `C = (S0 - A·G) / k`
//!
//! With a fixed offset two blocks suffice.
//!
//! Multi-exponential seeds search a lifetime grid around the RLD lifetime and
//! solve the linear parameters (amplitudes and offset) by weighted least
//! squares for each candidate.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::domain::{FitFunction, H_INDEX};
use crate::fit::fitter::FitProblem;
use crate::fit::tau_grid::lifetime_grid;
use crate::math::solve_weighted_least_squares;

/// Lifetime ratio between neighbouring grid components.
const GRID_MIN_RATIO: f64 = 1.5;
/// Grid span relative to the RLD lifetime (both directions).
const GRID_SPAN: f64 = 10.0;

/// Single-exponential estimate `A·exp(-t/T) + C`, `t = 0` at the first bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RldEstimate {
    pub a: f64,
    pub tau: f64,
    pub c: f64,
}

/// Triple-block RLD with a free offset.
///
/// Returns `None` when the data does not decay monotonically enough for the
/// closed form (`q` outside `(0, 1)`).
pub fn rld_free_offset(data: &[f64], x_inc: f64) -> Option<RldEstimate> {
    let k = data.len() / 3;
    if k == 0 {
        return None;
    }
    let s0: f64 = data[..k].iter().sum();
    let s1: f64 = data[k..2 * k].iter().sum();
    let s2: f64 = data[2 * k..3 * k].iter().sum();
    let d01 = s0 - s1;
    let d12 = s1 - s2;
    if !(d01 > 0.0 && d12 > 0.0 && d12 < d01) {
        return None;
    }
    let q = d12 / d01;
    let (tau, g) = block_geometry(q, k, x_inc)?;
    let a = d01 / (g * (1.0 - q));
    let c = (s0 - a * g) / k as f64;
    finite(RldEstimate { a, tau, c })
}

/// Two-block RLD with the offset held at `c`.
pub fn rld_fixed_offset(data: &[f64], x_inc: f64, c: f64) -> Option<RldEstimate> {
    let k = data.len() / 2;
    if k == 0 {
        return None;
    }
    let s0: f64 = data[..k].iter().map(|y| y - c).sum();
    let s1: f64 = data[k..2 * k].iter().map(|y| y - c).sum();
    if !(s0 > 0.0 && s1 > 0.0 && s1 < s0) {
        return None;
    }
    let q = s1 / s0;
    let (tau, g) = block_geometry(q, k, x_inc)?;
    finite(RldEstimate { a: s0 / g, tau, c })
}

/// Lifetime and `G = Σ_{i<k} r^i` for a block ratio `q = r^k`.
fn block_geometry(q: f64, k: usize, x_inc: f64) -> Option<(f64, f64)> {
    let ln_q = q.ln();
    if !(ln_q.is_finite() && ln_q < 0.0) {
        return None;
    }
    let tau = -(k as f64) * x_inc / ln_q;
    let r = (ln_q / k as f64).exp();
    let g = if (1.0 - r).abs() < 1e-15 { k as f64 } else { (1.0 - q) / (1.0 - r) };
    Some((tau, g))
}

fn finite(est: RldEstimate) -> Option<RldEstimate> {
    (est.a.is_finite() && est.tau.is_finite() && est.tau > 0.0 && est.c.is_finite()).then_some(est)
}

/// Crude estimate used when the closed form fails.
///
/// Offset from the tail (or `fixed_c`), amplitude from the maximum, lifetime
/// from the first drop below `1/e` of the amplitude.
pub fn fallback_estimate(data: &[f64], x_inc: f64, fixed_c: Option<f64>) -> RldEstimate {
    let n = data.len().max(1);
    let c = fixed_c.unwrap_or_else(|| {
        let tail = (data.len() / 10).max(1).min(data.len());
        if tail == 0 {
            0.0
        } else {
            data[data.len() - tail..].iter().sum::<f64>() / tail as f64
        }
    });
    let (peak_idx, peak) = data
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });
    let a = (peak - c).max(1.0);
    let level = c + a / std::f64::consts::E;
    let tau = data
        .iter()
        .enumerate()
        .skip(peak_idx)
        .find(|(_, y)| **y <= level)
        .map(|(i, _)| (i - peak_idx) as f64 * x_inc)
        .filter(|t| *t > 0.0)
        .unwrap_or(n as f64 * x_inc / 4.0);
    RldEstimate { a, tau: tau.max(x_inc), c }
}

/// Single-exponential estimate of a data window, falling back to the crude
/// estimate when RLD fails.
pub fn estimate_single(data: &[f64], x_inc: f64, fixed_c: Option<f64>) -> RldEstimate {
    let rld = match fixed_c {
        Some(c) => rld_fixed_offset(data, x_inc, c),
        None => rld_free_offset(data, x_inc),
    };
    rld.unwrap_or_else(|| fallback_estimate(data, x_inc, fixed_c))
}

/// Full parameter vector estimated from the data.
///
/// Entries whose `free` flag is false keep their value from `initial`.
pub fn estimate_parameters(problem: &FitProblem, initial: Option<&[f64]>, free: &[bool]) -> Vec<f64> {
    let function = problem.function();
    let c_index = function.c_index();
    let mut params = initial
        .map(|p| p.to_vec())
        .unwrap_or_else(|| vec![0.0; function.param_count()]);

    let fixed_c = (!free[c_index]).then_some(params[c_index]);
    let single = estimate_single(&problem.observed, problem.x_inc, fixed_c);
    // Amplitude at the model origin rather than at data_start.
    let shift = problem.model.amplitude_scale(single.tau);

    let mut set = |index: usize, value: f64| {
        if free[index] {
            params[index] = value;
        }
    };

    match function {
        FitFunction::Stretched => {
            set(0, single.a * shift);
            set(1, single.tau);
            set(H_INDEX, 1.0);
            set(c_index, single.c);
        }
        FitFunction::Single if free.iter().all(|f| *f) && !problem.model.has_irf() => {
            set(0, single.a);
            set(1, single.tau);
            set(c_index, single.c);
        }
        _ => {
            grid_seed(problem, &mut params, free, single);
        }
    }
    params
}

/// Search free lifetimes on a grid and solve the free linear parameters.
fn grid_seed(problem: &FitProblem, params: &mut [f64], free: &[bool], single: RldEstimate) {
    let function = problem.function();
    let components = function.components();
    let tau_free: Vec<usize> = (0..components).map(|i| 2 * i + 1).filter(|&t| free[t]).collect();

    let candidates = if tau_free.is_empty() {
        vec![Vec::new()]
    } else {
        let steps = if tau_free.len() >= 3 { 12 } else { 16 };
        let min = (single.tau / GRID_SPAN).max(problem.x_inc / 4.0);
        let max = (single.tau * GRID_SPAN).max(min * 2.0);
        lifetime_grid(tau_free.len(), min, max, steps, GRID_MIN_RATIO).unwrap_or_default()
    };

    let weights = problem.seed_weights();
    let best = candidates
        .par_iter()
        .enumerate()
        .filter_map(|(idx, taus)| {
            let mut trial = params.to_vec();
            for (&t, &tau) in tau_free.iter().zip(taus) {
                trial[t] = tau;
            }
            let chi = solve_linear(problem, &mut trial, free, &weights)?;
            Some((idx, chi, trial))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    match best {
        Some((_, _, trial)) => params.copy_from_slice(&trial),
        None => {
            // Spread lifetimes around the single estimate.
            for i in 0..components {
                let factor = 2f64.powi(components as i32 / 2 - i as i32);
                if free[2 * i] {
                    params[2 * i] = single.a / components as f64;
                }
                if free[2 * i + 1] {
                    params[2 * i + 1] = single.tau * factor;
                }
            }
            if free[function.c_index()] {
                params[function.c_index()] = single.c;
            }
        }
    }
}

/// Solve amplitudes and offset for fixed lifetimes; returns the chi-square.
fn solve_linear(problem: &FitProblem, params: &mut [f64], free: &[bool], weights: &[f64]) -> Option<f64> {
    let function = problem.function();
    let c_index = function.c_index();
    let linear: Vec<usize> = (0..function.components())
        .map(|i| 2 * i)
        .chain(std::iter::once(c_index))
        .collect();

    let n = problem.len();
    let mut values = vec![0.0; n];
    let mut columns = DMatrix::zeros(n, linear.len());
    problem.model.predict_with_jacobian(params, &linear, &mut values, &mut columns);

    let mut y = DVector::from_column_slice(&problem.observed);
    let free_cols: Vec<usize> = (0..linear.len()).filter(|&j| free[linear[j]]).collect();
    for (j, &p) in linear.iter().enumerate() {
        if !free[p] {
            y -= columns.column(j) * params[p];
        }
    }

    if !free_cols.is_empty() {
        let x = columns.select_columns(&free_cols);
        let beta = solve_weighted_least_squares(&x, &y, weights)?;
        if beta.iter().any(|v| !v.is_finite()) {
            return None;
        }
        for (k, &j) in free_cols.iter().enumerate() {
            params[linear[j]] = beta[k];
        }
        y -= x * beta;
    }

    let chi = y
        .iter()
        .zip(weights)
        .map(|(r, w)| w * r * r)
        .sum::<f64>();
    chi.is_finite().then_some(chi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NoiseModel;
    use crate::models::predict_curve;

    #[test]
    fn free_offset_rld_is_exact_on_noise_free_data() {
        let data = predict_curve(FitFunction::Single, &[500.0, 2.5, 7.0], 0.05, 240);
        let est = rld_free_offset(&data, 0.05).unwrap();
        assert!((est.a - 500.0).abs() < 1e-6);
        assert!((est.tau - 2.5).abs() < 1e-9);
        assert!((est.c - 7.0).abs() < 1e-6);
    }

    #[test]
    fn fixed_offset_rld_is_exact_on_noise_free_data() {
        let data = predict_curve(FitFunction::Single, &[80.0, 1.2, 3.0], 0.1, 101);
        let est = rld_fixed_offset(&data, 0.1, 3.0).unwrap();
        assert!((est.a - 80.0).abs() < 1e-8);
        assert!((est.tau - 1.2).abs() < 1e-10);
    }

    #[test]
    fn flat_data_falls_back() {
        let data = vec![5.0; 30];
        assert!(rld_free_offset(&data, 0.1).is_none());
        let est = estimate_single(&data, 0.1, None);
        assert!(est.tau > 0.0 && est.a > 0.0);
    }

    #[test]
    fn double_seed_finds_both_lifetimes_roughly() {
        let truth = [300.0, 3.0, 600.0, 0.4, 2.0];
        let data = predict_curve(FitFunction::Double, &truth, 0.05, 256);
        let problem = FitProblem::from_window(FitFunction::Double, NoiseModel::Const, 0.05, &data);
        let seed = estimate_parameters(&problem, None, &[true; 5]);
        assert!(seed[1] > seed[3]);
        assert!((seed[1] / 3.0 - 1.0).abs() < 0.35, "T1={}", seed[1]);
        assert!((seed[3] / 0.4 - 1.0).abs() < 0.35, "T2={}", seed[3]);
    }

    #[test]
    fn fixed_entries_survive_estimation() {
        let data = predict_curve(FitFunction::Single, &[100.0, 2.0, 1.0], 0.1, 64);
        let problem = FitProblem::from_window(FitFunction::Single, NoiseModel::Const, 0.1, &data);
        let initial = [0.0, 1.75, 0.0];
        let seed = estimate_parameters(&problem, Some(&initial), &[true, false, true]);
        assert_eq!(seed[1].to_bits(), 1.75f64.to_bits());
        assert!(seed[0] > 0.0);
    }
}
