//! Instrument-response handling.
//!
//! A measured decay is the true exponential decay convolved with the
//! instrument response (the "prompt"). The prompt window is baseline
//! subtracted, clipped at zero and normalised to unit area so that the
//! fitted amplitudes keep the meaning they have without a prompt.

use crate::domain::BinRange;

/// Build a unit-area instrument response from a prompt window.
///
/// Returns `None` when nothing is left above the baseline.
pub fn normalized_irf(prompt: &[f64], window: BinRange, baseline: f64) -> Option<Vec<f64>> {
    let stop = window.stop.min(prompt.len());
    if window.start >= stop {
        return None;
    }
    let irf: Vec<f64> = prompt[window.start..stop]
        .iter()
        .map(|&v| (v - baseline).max(0.0))
        .collect();
    let area: f64 = irf.iter().sum();
    if !(area.is_finite() && area > 0.0) {
        return None;
    }
    Some(irf.into_iter().map(|v| v / area).collect())
}

/// Causal discrete convolution: `out[i] = Σ_j irf[j] · signal[i - j]`.
pub fn convolve_into(irf: &[f64], signal: &[f64], out: &mut [f64]) {
    for (i, slot) in out.iter_mut().enumerate().take(signal.len()) {
        let mut acc = 0.0;
        for (j, &h) in irf.iter().enumerate().take(i + 1) {
            acc += h * signal[i - j];
        }
        *slot = acc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irf_is_baseline_subtracted_and_normalized() {
        let prompt = [1.0, 1.0, 3.0, 5.0, 2.0, 1.0];
        let irf = normalized_irf(&prompt, BinRange::new(1, 5), 1.0).unwrap();
        assert_eq!(irf.len(), 4);
        assert!((irf.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(irf[0], 0.0);
        assert!((irf[2] - 4.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn flat_prompt_has_no_irf() {
        assert!(normalized_irf(&[2.0; 8], BinRange::new(0, 8), 2.0).is_none());
    }

    #[test]
    fn delta_irf_is_identity() {
        let signal = [5.0, 4.0, 3.0, 2.0];
        let mut out = [0.0; 4];
        convolve_into(&[1.0], &signal, &mut out);
        assert_eq!(out, signal);

        convolve_into(&[0.0, 1.0], &signal, &mut out);
        assert_eq!(out, [0.0, 5.0, 4.0, 3.0]);
    }
}
