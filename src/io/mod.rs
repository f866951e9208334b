//! Input/output helpers.
//!
//! - transient JSON read/write (`transient`)
//! - fit report and value-image exports (`export`)

pub mod export;
pub mod transient;

pub use export::*;
pub use transient::*;
