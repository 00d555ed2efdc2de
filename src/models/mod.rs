//! The exponential relaxation model `a * exp(b * t) + c`.
//!
//! Implemented as small, pure functions so the fitter and renderers share one
//! definition.

pub mod model;

pub use model::*;
