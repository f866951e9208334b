//! Scalar values derived from a fitted parameter vector.
//!
//! Both functions read amplitudes at `2·i` and lifetimes at `2·i + 1`
//! (`A1_INDEX`, `T1_INDEX`, ...). A zero amplitude sum has no meaningful
//! ratio, so it yields `NaN` rather than an error.

use crate::domain::{A1_INDEX, T1_INDEX};

/// `A_i / Σ A_j` for component `component` of a `components`-exponential fit.
///
/// Returns `NaN` for an invalid component index or count, a parameter vector
/// too short for `components`, or a zero amplitude sum.
pub fn fractional_intensity(params: &[f64], component: usize, components: usize) -> f64 {
    if !(1..=3).contains(&components) || component >= components || params.len() < 2 * components {
        return f64::NAN;
    }
    let sum: f64 = (0..components).map(|i| params[A1_INDEX + 2 * i]).sum();
    if sum == 0.0 {
        return f64::NAN;
    }
    params[A1_INDEX + 2 * component] / sum
}

/// Amplitude-weighted mean lifetime `Σ A_i·T_i / Σ A_i`.
///
/// For one component this is `T`. Returns `NaN` for a zero amplitude sum or an
/// invalid component count.
pub fn mean_lifetime(params: &[f64], components: usize) -> f64 {
    if !(1..=3).contains(&components) || params.len() < 2 * components {
        return f64::NAN;
    }
    let (mut weighted, mut sum) = (0.0, 0.0);
    for i in 0..components {
        let a = params[A1_INDEX + 2 * i];
        weighted += a * params[T1_INDEX + 2 * i];
        sum += a;
    }
    if sum == 0.0 {
        return f64::NAN;
    }
    weighted / sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn fractions_sum_to_one() {
        let params = [300.0, 2.0, 500.0, 0.7, 200.0, 0.1, 4.0];
        let total: f64 = (0..3).map(|i| fractional_intensity(&params, i, 3)).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        assert_relative_eq!(fractional_intensity(&params, 1, 3), 0.5);
    }

    #[test]
    fn mean_lifetime_weights_by_amplitude() {
        let params = [100.0, 3.0, 300.0, 1.0, 0.0];
        assert_relative_eq!(mean_lifetime(&params, 2), 1.5);
        assert_relative_eq!(mean_lifetime(&[10.0, 2.5, 1.0], 1), 2.5);
    }

    #[test]
    fn zero_amplitudes_give_nan() {
        let params = [0.0, 3.0, 0.0, 1.0, 0.0];
        assert!(fractional_intensity(&params, 0, 2).is_nan());
        assert!(mean_lifetime(&params, 2).is_nan());
    }

    #[test]
    fn invalid_component_gives_nan() {
        let params = [1.0, 3.0, 1.0, 1.0, 0.0];
        assert!(fractional_intensity(&params, 2, 2).is_nan());
        assert!(fractional_intensity(&params, 0, 4).is_nan());
        assert!(mean_lifetime(&params, 3).is_nan());
    }
}
