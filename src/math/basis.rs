//! Exponential basis functions and their partial derivatives.
//!
//! The model is linear in the amplitudes `A_i` and the offset `C`, so the
//! model layer only needs the unit-amplitude components:
//!
//! - `e(t, τ) = exp(-t/τ)`
//! - `s(t, τ, h) = exp(-(t/τ)^(1/h))` (stretched)
//!
//! Numerical notes:
//! - lifetimes and stretch exponents are floored at `TAU_EPS` so a solver step
//!   that drives them to zero yields a finite (if poor) model instead of NaN.
//! - at `t = 0` the stretched derivatives are 0 analytically even though the
//!   `ln(t/τ)` factor diverges, so that case is handled explicitly.

/// Floor for lifetimes and stretch exponents.
pub const TAU_EPS: f64 = 1e-12;

/// `exp(-t/τ)`.
pub fn decay(t: f64, tau: f64) -> f64 {
    (-t / tau.max(TAU_EPS)).exp()
}

/// `∂/∂τ exp(-t/τ) = t/τ² · exp(-t/τ)`.
pub fn decay_dtau(t: f64, tau: f64) -> f64 {
    let tau = tau.max(TAU_EPS);
    t / (tau * tau) * (-t / tau).exp()
}

/// `exp(-(t/τ)^(1/h))`.
pub fn stretched(t: f64, tau: f64, h: f64) -> f64 {
    if t <= 0.0 {
        return 1.0;
    }
    let s = (t / tau.max(TAU_EPS)).powf(1.0 / h.max(TAU_EPS));
    (-s).exp()
}

/// Value and partial derivatives `(s, ∂s/∂τ, ∂s/∂h)` of the stretched component.
pub fn stretched_partials(t: f64, tau: f64, h: f64) -> (f64, f64, f64) {
    if t <= 0.0 {
        return (1.0, 0.0, 0.0);
    }
    let tau = tau.max(TAU_EPS);
    let h = h.max(TAU_EPS);
    let u = t / tau;
    let s = u.powf(1.0 / h);
    if !s.is_finite() {
        return (0.0, 0.0, 0.0);
    }
    let e = (-s).exp();
    let d_tau = e * s / (h * tau);
    let d_h = e * s * u.ln() / (h * h);
    (e, d_tau, d_h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stretched_with_unit_exponent_is_plain_decay() {
        for &t in &[0.0, 0.1, 1.0, 4.0] {
            assert!((stretched(t, 2.0, 1.0) - decay(t, 2.0)).abs() < 1e-14);
        }
    }

    #[test]
    fn partials_match_finite_differences() {
        let (t, tau, h) = (1.3, 2.1, 1.4);
        let eps = 1e-6;

        let numeric = (decay(t, tau + eps) - decay(t, tau - eps)) / (2.0 * eps);
        assert!((numeric - decay_dtau(t, tau)).abs() < 1e-8);

        let (_, d_tau, d_h) = stretched_partials(t, tau, h);
        let num_tau = (stretched(t, tau + eps, h) - stretched(t, tau - eps, h)) / (2.0 * eps);
        let num_h = (stretched(t, tau, h + eps) - stretched(t, tau, h - eps)) / (2.0 * eps);
        assert!((num_tau - d_tau).abs() < 1e-8);
        assert!((num_h - d_h).abs() < 1e-8);
    }

    #[test]
    fn degenerate_lifetime_stays_finite() {
        assert!(decay(1.0, 0.0).is_finite());
        assert!(decay_dtau(1.0, -1.0).is_finite());
        let (v, a, b) = stretched_partials(1.0, 0.0, 0.0);
        assert!(v.is_finite() && a.is_finite() && b.is_finite());
    }
}
