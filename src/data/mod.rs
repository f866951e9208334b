//! Input data: the decay image container and synthetic transients.

pub mod image;
pub mod sample;

pub use image::*;
pub use sample::*;
