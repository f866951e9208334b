//! Synthetic decay generation.
//!
//! Transients are built from the same model the fitter uses, optionally
//! convolved with a Gaussian prompt, then Poisson-sampled. Generation is
//! deterministic for a given seed.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Poisson;
use serde::{Deserialize, Serialize};

use crate::data::DecayImage;
use crate::domain::{BinRange, FitFunction};
use crate::error::FitError;
use crate::math::{convolve_into, normalized_irf};
use crate::models::predict_curve;

/// Description of a synthetic measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecaySpec {
    pub function: FitFunction,
    /// True parameters (offset `C` is added to every bin).
    pub parameters: Vec<f64>,
    pub bins: usize,
    pub x_inc: f64,
    /// Bin where the excitation arrives.
    pub onset: usize,
    /// Gaussian prompt width (sigma, in bins); `None` gives an ideal pulse.
    pub prompt_sigma: Option<f64>,
    /// Peak height of the recorded prompt.
    pub prompt_peak: f64,
    /// Skip Poisson sampling.
    pub noise_free: bool,
    pub seed: u64,
}

impl DecaySpec {
    pub fn new(function: FitFunction, parameters: Vec<f64>, bins: usize, x_inc: f64) -> Self {
        Self {
            function,
            parameters,
            bins,
            x_inc,
            onset: 0,
            prompt_sigma: None,
            prompt_peak: 1000.0,
            noise_free: false,
            seed: 42,
        }
    }

    fn validate(&self) -> Result<(), FitError> {
        if self.parameters.len() != self.function.param_count() {
            return Err(FitError::InvalidInput(format!(
                "{} expects {} parameters, got {}",
                self.function.display_name(),
                self.function.param_count(),
                self.parameters.len()
            )));
        }
        if self.bins == 0 || self.onset >= self.bins {
            return Err(FitError::InvalidInput(format!(
                "onset {} must lie inside {} bins",
                self.onset, self.bins
            )));
        }
        if !(self.x_inc.is_finite() && self.x_inc > 0.0) {
            return Err(FitError::InvalidInput(format!("x_inc must be > 0, got {}", self.x_inc)));
        }
        if let Some(sigma) = self.prompt_sigma {
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(FitError::InvalidInput(format!("prompt sigma must be > 0, got {sigma}")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedDecay {
    pub decay: Vec<f64>,
    /// Recorded prompt (Poisson-sampled unless noise free).
    pub prompt: Option<Vec<f64>>,
    /// Noise-free expectation of `decay`.
    pub expected: Vec<f64>,
}

/// Simulate one transient.
pub fn simulate_decay(spec: &DecaySpec) -> Result<SimulatedDecay, FitError> {
    spec.validate()?;
    let mut rng = StdRng::seed_from_u64(spec.seed);
    simulate_with(spec, &mut rng)
}

/// Simulate a `width × height` image; pixel `i` uses seed `spec.seed + i`.
pub fn simulate_image(spec: &DecaySpec, width: usize, height: usize) -> Result<DecayImage, FitError> {
    spec.validate()?;
    let mut data = Vec::with_capacity(width * height * spec.bins);
    for i in 0..width * height {
        let mut rng = StdRng::seed_from_u64(spec.seed.wrapping_add(i as u64));
        data.extend(simulate_with(spec, &mut rng)?.decay);
    }
    DecayImage::new(width, height, spec.bins, data)
}

fn simulate_with(spec: &DecaySpec, rng: &mut StdRng) -> Result<SimulatedDecay, FitError> {
    let c = spec.parameters[spec.function.c_index()];
    let mut exponential = spec.parameters.clone();
    exponential[spec.function.c_index()] = 0.0;

    let (expected, prompt) = match spec.prompt_sigma {
        Some(sigma) => {
            let shape: Vec<f64> = (0..spec.bins)
                .map(|i| {
                    let z = (i as f64 - spec.onset as f64) / sigma;
                    (-0.5 * z * z).exp()
                })
                .collect();
            let irf = normalized_irf(&shape, BinRange::new(0, spec.bins), 0.0)
                .ok_or_else(|| FitError::InvalidInput("prompt has no area".into()))?;
            let decay = predict_curve(spec.function, &exponential, spec.x_inc, spec.bins);
            let mut convolved = vec![0.0; spec.bins];
            convolve_into(&irf, &decay, &mut convolved);
            let expected: Vec<f64> = convolved.into_iter().map(|v| v + c).collect();
            let prompt = shape.iter().map(|v| v * spec.prompt_peak).collect();
            (expected, Some(prompt))
        }
        None => {
            let tail = predict_curve(spec.function, &exponential, spec.x_inc, spec.bins - spec.onset);
            let expected = std::iter::repeat_n(0.0, spec.onset)
                .chain(tail)
                .map(|v| v + c)
                .collect();
            (expected, None)
        }
    };

    if spec.noise_free {
        return Ok(SimulatedDecay {
            decay: expected.clone(),
            prompt,
            expected,
        });
    }
    let decay = poisson_sample(&expected, rng)?;
    let prompt = prompt.map(|p| poisson_sample(&p, rng)).transpose()?;
    Ok(SimulatedDecay {
        decay,
        prompt,
        expected,
    })
}

fn poisson_sample(expected: &[f64], rng: &mut StdRng) -> Result<Vec<f64>, FitError> {
    expected
        .iter()
        .map(|&lambda| {
            if lambda <= 0.0 {
                return Ok(0.0);
            }
            let dist = Poisson::new(lambda)
                .map_err(|e| FitError::InvalidInput(format!("noise distribution error: {e}")))?;
            Ok(dist.sample(rng))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_free_decay_starts_at_onset() {
        let mut spec = DecaySpec::new(FitFunction::Single, vec![100.0, 2.0, 1.0], 64, 0.1);
        spec.onset = 10;
        spec.noise_free = true;
        let sim = simulate_decay(&spec).unwrap();
        assert_eq!(sim.decay[9], 1.0);
        assert!((sim.decay[10] - 101.0).abs() < 1e-12);
        assert!(sim.prompt.is_none());
    }

    #[test]
    fn same_seed_same_counts() {
        let spec = DecaySpec::new(FitFunction::Double, vec![300.0, 2.0, 200.0, 0.5, 2.0], 128, 0.05);
        let a = simulate_decay(&spec).unwrap();
        let b = simulate_decay(&spec).unwrap();
        assert_eq!(a, b);
        assert!(a.decay.iter().all(|v| *v >= 0.0 && v.fract() == 0.0));
    }

    #[test]
    fn gaussian_prompt_preserves_area() {
        let mut spec = DecaySpec::new(FitFunction::Single, vec![100.0, 1.0, 0.0], 256, 0.05);
        spec.onset = 40;
        spec.prompt_sigma = Some(3.0);
        spec.noise_free = true;
        let sim = simulate_decay(&spec).unwrap();
        let prompt = sim.prompt.unwrap();
        let peak = (0..256).max_by(|&a, &b| prompt[a].total_cmp(&prompt[b])).unwrap();
        assert_eq!(peak, 40);
        // Convolution with a unit-area response keeps the decay's total counts
        // (up to the truncated tail).
        let raw: f64 = predict_curve(FitFunction::Single, &[100.0, 1.0, 0.0], 0.05, 256).iter().sum();
        let total: f64 = sim.decay.iter().sum();
        assert!((total / raw - 1.0).abs() < 0.01);
    }

    #[test]
    fn image_pixels_differ() {
        let spec = DecaySpec::new(FitFunction::Single, vec![200.0, 2.0, 1.0], 32, 0.1);
        let image = simulate_image(&spec, 2, 1).unwrap();
        assert_ne!(image.transient_at(0), image.transient_at(1));
    }
}
