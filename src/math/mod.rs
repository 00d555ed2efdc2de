//! Mathematical utilities: dense least squares and pseudo-inverse.

pub mod ols;

pub use ols::*;
