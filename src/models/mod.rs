//! Decay model implementations.
//!
//! Models are evaluated over a fixed fit window so that fitting/search code can
//! stay generic over the function kind and the presence of a prompt.

pub mod model;

pub use model::*;
