//! Spatial binning of decay images.
//!
//! Binning trades spatial resolution for photons: each output pixel holds the
//! sum of its square neighbourhood (clipped at the image edges). Binners are
//! looked up by name so front ends can list them.

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::data::DecayImage;
use crate::error::FitError;

pub trait Binner: Send + Sync {
    fn name(&self) -> &str;

    fn bin(&self, image: &DecayImage) -> Result<DecayImage, FitError>;
}

/// Sums a `(2r+1)×(2r+1)` neighbourhood around each pixel.
#[derive(Debug, Clone, Copy)]
pub struct SquareBinner {
    pub radius: usize,
}

impl Binner for SquareBinner {
    fn name(&self) -> &str {
        match self.radius {
            0 => "none",
            1 => "3x3",
            2 => "5x5",
            3 => "7x7",
            _ => "square",
        }
    }

    fn bin(&self, image: &DecayImage) -> Result<DecayImage, FitError> {
        let (width, height, bins) = (image.width(), image.height(), image.bins());
        let r = self.radius;
        let data: Vec<f64> = (0..image.pixel_count())
            .into_par_iter()
            .flat_map_iter(|index| {
                let (x, y) = image.coordinates(index);
                let mut acc = vec![0.0; bins];
                for ny in y.saturating_sub(r)..=(y + r).min(height - 1) {
                    for nx in x.saturating_sub(r)..=(x + r).min(width - 1) {
                        for (a, v) in acc.iter_mut().zip(image.transient_at(ny * width + nx)) {
                            *a += v;
                        }
                    }
                }
                acc
            })
            .collect();
        let binned = DecayImage::new(width, height, bins, data)?;
        match image.roi() {
            Some(labels) => binned.with_roi(labels.to_vec()),
            None => Ok(binned),
        }
    }
}

#[derive(Clone, Default)]
pub struct BinningRegistry {
    binners: BTreeMap<String, Arc<dyn Binner>>,
}

impl BinningRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `none`, `3x3`, `5x5` and `7x7` square binners.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for radius in 0..=3 {
            registry.register(Arc::new(SquareBinner { radius }));
        }
        registry
    }

    pub fn register(&mut self, binner: Arc<dyn Binner>) {
        self.binners.insert(binner.name().to_string(), binner);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Binner>, FitError> {
        self.binners
            .get(name)
            .cloned()
            .ok_or_else(|| FitError::InvalidInput(format!("unknown binning '{name}'")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.binners.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for BinningRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.binners.keys()).finish()
    }
}
