//! Mathematical utilities: exponential basis functions, instrument-response
//! convolution and least squares solvers.

pub mod basis;
pub mod convolve;
pub mod ols;

pub use basis::*;
pub use convolve::*;
pub use ols::*;
