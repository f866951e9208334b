//! Domain types used throughout the fitting pipeline.
//!
//! This module defines:
//!
//! - configuration enums (`FitAlgorithm`, `FitFunction`, `NoiseModel`, `FitRegion`)
//! - parameter-vector index constants shared with the derived image values
//! - fit settings (`GlobalFitParams`) and per-request state (`FitInfo`)
//! - fit outputs (`FitResult`, `FitStatus`)

pub mod params;
pub mod types;

pub use params::*;
pub use types::*;
