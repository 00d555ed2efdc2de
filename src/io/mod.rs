//! Input/output helpers.
//!
//! - time-series loading + timestamp handling (`loader`)
//! - decay window definitions (`windows`)
//! - render-ready exports (CSV/JSON) (`export`)

pub mod export;
pub mod loader;
pub mod windows;

pub use export::*;
pub use loader::*;
pub use windows::*;
