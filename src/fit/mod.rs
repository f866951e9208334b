//! Curve fitting.
//!
//! Responsibilities:
//!
//! - estimate seeds with rapid lifetime determination (RLD) and a lifetime grid
//! - refine them with Levenberg–Marquardt over the free parameters
//! - expose the algorithms by name (`FitterRegistry`)
//! - fit whole images region by region (`FitEngine`)

pub mod engine;
pub mod fitter;
pub mod lma;
pub mod registry;
pub mod rld;
pub mod tau_grid;

pub use engine::*;
pub use fitter::*;
pub use lma::*;
pub use registry::*;
pub use rld::*;
pub use tau_grid::*;
