//! Decay fitting and normalization.
//!
//! Responsibilities:
//!
//! - fit `a * exp(b * t) + c` by Levenberg–Marquardt (`exponential`)
//! - map fitted curves to `(y - c) / a` (`rescale`)
//! - align several events for overlay (`align`)

pub mod align;
pub mod exponential;
pub mod rescale;

pub use align::*;
pub use exponential::*;
pub use rescale::*;
