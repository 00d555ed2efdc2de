//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - calibration coefficients and raw sample records
//! - the loaded `TimeSeries` with its ordering invariants
//! - fit outputs (`DecayParams`, `ExpFit`) and query windows (`WindowSpec`)

pub mod types;

pub use types::*;
