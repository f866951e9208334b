//! Preprocessing applied to decay images before fitting.

pub mod binning;

pub use binning::*;
