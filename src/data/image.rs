//! Decay image container.
//!
//! Counts are stored pixel-major (`data[(y·width + x)·bins + bin]`) so each
//! pixel's transient is a contiguous slice.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::FitError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayImage {
    width: usize,
    height: usize,
    bins: usize,
    data: Vec<f64>,
    /// ROI label per pixel; `0` means outside any ROI.
    roi: Option<Vec<u32>>,
}

impl DecayImage {
    pub fn new(width: usize, height: usize, bins: usize, data: Vec<f64>) -> Result<Self, FitError> {
        if width == 0 || height == 0 || bins == 0 {
            return Err(FitError::InvalidInput(format!(
                "image dimensions must be non-zero, got {width}x{height}x{bins}"
            )));
        }
        if data.len() != width * height * bins {
            return Err(FitError::InvalidInput(format!(
                "expected {} samples for {width}x{height}x{bins}, got {}",
                width * height * bins,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            bins,
            data,
            roi: None,
        })
    }

    /// Attach a row-major ROI label map.
    pub fn with_roi(mut self, labels: Vec<u32>) -> Result<Self, FitError> {
        if labels.len() != self.pixel_count() {
            return Err(FitError::InvalidInput(format!(
                "ROI map has {} entries for {} pixels",
                labels.len(),
                self.pixel_count()
            )));
        }
        self.roi = Some(labels);
        Ok(self)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    pub fn roi(&self) -> Option<&[u32]> {
        self.roi.as_deref()
    }

    /// Transient of pixel `index` (row-major).
    pub fn transient_at(&self, index: usize) -> &[f64] {
        &self.data[index * self.bins..(index + 1) * self.bins]
    }

    pub fn transient(&self, x: usize, y: usize) -> Option<&[f64]> {
        (x < self.width && y < self.height).then(|| self.transient_at(y * self.width + x))
    }

    /// Row-major `(x, y)` of pixel `index`.
    pub fn coordinates(&self, index: usize) -> (usize, usize) {
        (index % self.width, index / self.width)
    }

    /// Sum of every pixel's transient.
    pub fn summed(&self) -> Vec<f64> {
        self.sum_where(|_| true)
    }

    /// Distinct non-zero ROI labels in ascending order.
    pub fn roi_labels(&self) -> Vec<u32> {
        self.roi
            .as_ref()
            .map(|labels| {
                labels
                    .iter()
                    .copied()
                    .filter(|l| *l != 0)
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Summed transient of the pixels labelled `label`.
    pub fn roi_sum(&self, label: u32) -> Vec<f64> {
        match &self.roi {
            Some(labels) => self.sum_where(|i| labels[i] == label),
            None => vec![0.0; self.bins],
        }
    }

    fn sum_where(&self, include: impl Fn(usize) -> bool) -> Vec<f64> {
        let mut out = vec![0.0; self.bins];
        for (i, transient) in self.data.chunks(self.bins).enumerate() {
            if include(i) {
                for (acc, v) in out.iter_mut().zip(transient) {
                    *acc += v;
                }
            }
        }
        out
    }
}
