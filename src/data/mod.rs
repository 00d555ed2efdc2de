//! Measurement sources.
//!
//! - `airgradient`: blocking HTTP client for the AirGradient public API
//! - `synthetic`: deterministic decay generator for offline runs and tests
//! - `retry`: bounded retry with exponential backoff for upstream calls

use crate::domain::SampleRecord;
use crate::error::DecayError;

pub mod airgradient;
pub mod retry;
pub mod synthetic;

pub use airgradient::*;
pub use retry::*;
pub use synthetic::*;

/// Where sample records come from.
///
/// Window bounds use the compact wire token `YYYYMMDDTHHMMSSZ`
/// (see [`crate::io::format_window_bound`]).
pub trait MeasurementSource {
    /// Fetch all records for `location_id` between `from` and `to`.
    fn fetch(&self, location_id: &str, from: &str, to: &str) -> Result<Vec<SampleRecord>, DecayError>;

    /// Fetch the most recent record for `location_id`.
    fn fetch_current(&self, location_id: &str) -> Result<SampleRecord, DecayError>;
}
