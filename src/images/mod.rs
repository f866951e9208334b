//! Derived image values.
//!
//! Pure functions of a fitted parameter vector, plus a builder that maps them
//! over an `Each` fit report.

pub mod fitted;
pub mod values;

pub use fitted::*;
pub use values::*;
