//! `flim-fit` library crate.
//!
//! Fluorescence lifetime analysis: cursor estimation, exponential curve
//! fitting (RLD and Levenberg–Marquardt) and derived per-pixel values.
//!
//! The binary (`flim`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the fit engine can be embedded by other front ends

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod heuristics;
pub mod images;
pub mod io;
pub mod math;
pub mod models;
pub mod preprocess;
pub mod report;
