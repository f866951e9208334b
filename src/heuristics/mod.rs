//! Heuristics that propose fit settings without user input.
//!
//! - `cursor`: prompt and decay windows from the curves
//! - `estimator`: default thresholds, targets and starting parameters

pub mod cursor;
pub mod estimator;

pub use cursor::*;
pub use estimator::*;
