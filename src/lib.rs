//! `airq-decay` library crate.
//!
//! The binary (`aq`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the fit engine is reusable without the HTTP client or the CLI
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod calibration;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod event;
pub mod fit;
pub mod io;
pub mod logging;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
