//! Linear sensor calibration.
//!
//! Calibrated readings are floored to whole units, matching the sensor's
//! reporting granularity. Flooring is lossy: up to one unit of the corrected
//! value is discarded, and negative corrected values round toward negative
//! infinity rather than toward zero.

use crate::domain::CalibrationCoefficients;
use crate::error::DecayError;

/// Supplies calibration coefficients for a location.
///
/// Coefficient derivation (comparison against a reference instrument) lives
/// outside this crate; implementations only hand back the resulting pair.
pub trait CoefficientSource {
    fn derive_coefficients(&self, location_id: &str) -> Result<CalibrationCoefficients, DecayError>;
}

/// A coefficient pair fixed by configuration.
#[derive(Debug, Clone, Copy)]
pub struct FixedCoefficients(pub CalibrationCoefficients);

impl CoefficientSource for FixedCoefficients {
    fn derive_coefficients(&self, _location_id: &str) -> Result<CalibrationCoefficients, DecayError> {
        Ok(self.0)
    }
}

/// Calibrate a single reading: `floor(value * slope + intercept)`.
pub fn apply_scalar(coefs: CalibrationCoefficients, value: f64) -> i64 {
    (value * coefs.slope + coefs.intercept).floor() as i64
}

/// Calibrate each reading independently (see [`apply_scalar`]).
pub fn apply_sequence(coefs: CalibrationCoefficients, values: &[f64]) -> Vec<i64> {
    values.iter().map(|&v| apply_scalar(coefs, v)).collect()
}

/// Like [`apply_scalar`], but rejects non-finite input and output.
pub fn try_apply_scalar(coefs: CalibrationCoefficients, value: f64) -> Result<i64, DecayError> {
    let corrected = value * coefs.slope + coefs.intercept;
    if !corrected.is_finite() {
        return Err(DecayError::MalformedRecord {
            index: 0,
            message: format!("non-finite calibrated value from reading {value}"),
        });
    }
    Ok(corrected.floor() as i64)
}

/// Like [`apply_sequence`], reporting the index of the first bad reading.
pub fn try_apply_sequence(coefs: CalibrationCoefficients, values: &[f64]) -> Result<Vec<i64>, DecayError> {
    values
        .iter()
        .enumerate()
        .map(|(index, &v)| {
            try_apply_scalar(coefs, v).map_err(|_| DecayError::MalformedRecord {
                index,
                message: format!("non-finite calibrated value from reading {v}"),
            })
        })
        .collect()
}
