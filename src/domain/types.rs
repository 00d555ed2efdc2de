//! Shared domain types.
//!
//! These types are kept small and serializable so they can be:
//!
//! - used in-memory during loading and fitting
//! - exported to JSON/CSV for external rendering

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::DecayError;

/// Calibrated CO2 channel (the only species with a known linear correction).
pub const CO2: &str = "rco2";
/// Total volatile organic compounds.
pub const TVOC: &str = "tvoc";
/// Particulate matter, 10 µm.
pub const PM10: &str = "pm10";

/// Linear sensor correction: `value * slope + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationCoefficients {
    pub slope: f64,
    pub intercept: f64,
}

impl CalibrationCoefficients {
    pub const IDENTITY: Self = Self {
        slope: 1.0,
        intercept: 0.0,
    };

    pub const fn new(slope: f64, intercept: f64) -> Self {
        Self { slope, intercept }
    }
}

impl Default for CalibrationCoefficients {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// One sensor reading as delivered by a measurement source.
///
/// The species set is an open map so that new API fields do not break ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub timestamp: String,
    pub values: BTreeMap<String, f64>,
}

impl SampleRecord {
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, species: &str, value: f64) -> Self {
        self.values.insert(species.to_string(), value);
        self
    }
}

/// A loaded, calibrated time series.
///
/// Invariants (enforced by [`TimeSeries::new`]):
/// - timestamps are sorted ascending
/// - `elapsed_hours[0] == 0` and elapsed time is non-decreasing
/// - every value column has the same length as `timestamps`
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    timestamps: Vec<DateTime<Utc>>,
    elapsed_hours: Vec<f64>,
    values: BTreeMap<String, Vec<f64>>,
}

impl TimeSeries {
    /// Build a series from parallel columns, sorting by timestamp.
    ///
    /// The sort is stable, so samples sharing an instant keep source order.
    pub fn new(
        timestamps: Vec<DateTime<Utc>>,
        values: BTreeMap<String, Vec<f64>>,
    ) -> Result<Self, DecayError> {
        let n = timestamps.len();
        for (species, column) in &values {
            if column.len() != n {
                return Err(DecayError::SpeciesMismatch {
                    index: column.len().min(n),
                    species: species.clone(),
                });
            }
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| timestamps[i]);

        let sorted_ts: Vec<DateTime<Utc>> = order.iter().map(|&i| timestamps[i]).collect();
        let values = values
            .into_iter()
            .map(|(species, column)| {
                let sorted = order.iter().map(|&i| column[i]).collect();
                (species, sorted)
            })
            .collect();

        let elapsed_hours = match sorted_ts.first() {
            Some(&t0) => sorted_ts.iter().map(|&t| elapsed_hours_between(t0, t)).collect(),
            None => Vec::new(),
        };

        Ok(Self {
            timestamps: sorted_ts,
            elapsed_hours,
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn elapsed_hours(&self) -> &[f64] {
        &self.elapsed_hours
    }

    pub fn values(&self, species: &str) -> Option<&[f64]> {
        self.values.get(species).map(Vec::as_slice)
    }

    pub fn species(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn has_species(&self, species: &str) -> bool {
        self.values.contains_key(species)
    }

    /// Elapsed time of the last sample (0 for an empty series).
    pub fn span_hours(&self) -> f64 {
        self.elapsed_hours.last().copied().unwrap_or(0.0)
    }
}

/// True elapsed time in hours (signed, never wrapped to a day).
pub fn elapsed_hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 3_600_000_000.0,
        None => delta.num_seconds() as f64 / 3600.0,
    }
}

/// Parameters of the relaxation model `a * exp(b * t) + c`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayParams {
    /// Amplitude (initial offset from the asymptote).
    pub a: f64,
    /// Rate in 1/hours (negative for decay).
    pub b: f64,
    /// Asymptotic (steady-state) value.
    pub c: f64,
}

impl DecayParams {
    pub const fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.a, self.b, self.c]
    }

    pub fn from_array(p: [f64; 3]) -> Self {
        Self::new(p[0], p[1], p[2])
    }

    pub fn is_finite(&self) -> bool {
        self.a.is_finite() && self.b.is_finite() && self.c.is_finite()
    }

    /// Relaxation time constant `τ = -1/b` in hours, when the model decays.
    pub fn time_constant(&self) -> Option<f64> {
        if self.b < 0.0 { Some(-1.0 / self.b) } else { None }
    }
}

/// Output of a single exponential fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpFit {
    pub params: DecayParams,
    /// Estimated parameter covariance, row-major in `(a, b, c)` order.
    ///
    /// Diagnostics only. Entries are infinite when the residual variance
    /// cannot be estimated (`n == 3`).
    pub covariance: [[f64; 3]; 3],
    pub sse: f64,
    pub rmse: f64,
    pub n: usize,
    pub iterations: usize,
}

impl ExpFit {
    pub fn time_constant(&self) -> Option<f64> {
        self.params.time_constant()
    }

    pub fn final_value(&self) -> f64 {
        self.params.c
    }

    /// Whether the fitted curve relaxes toward its asymptote (`b < 0`).
    pub fn is_decay(&self) -> bool {
        self.params.b < 0.0
    }

    /// One-sigma parameter uncertainties from the covariance diagonal.
    pub fn std_errors(&self) -> [f64; 3] {
        [0, 1, 2].map(|i| self.covariance[i][i].sqrt())
    }
}

/// How several events are aligned before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AlignMode {
    /// Truncate every event to the shortest sample count.
    Samples,
    /// Truncate every event to the shortest elapsed duration.
    Duration,
}

/// A caller-labelled query window for one decay event.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSpec {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub ventilation_open: bool,
    pub label: Option<String>,
}

impl WindowSpec {
    pub fn new(start: DateTime<Utc>, stop: DateTime<Utc>, ventilation_open: bool) -> Self {
        Self {
            start,
            stop,
            ventilation_open,
            label: None,
        }
    }

    pub fn validate(&self) -> Result<(), DecayError> {
        if self.stop <= self.start {
            return Err(DecayError::InvalidWindow {
                message: format!(
                    "stop {} is not after start {}",
                    self.stop.to_rfc3339(),
                    self.start.to_rfc3339()
                ),
            });
        }
        Ok(())
    }

    /// Display label: explicit label or the start instant.
    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => self.start.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 19, h, m, 0).unwrap()
    }

    #[test]
    fn time_series_sorts_unsorted_input() {
        let ts = vec![at(6, 10), at(6, 0), at(6, 5)];
        let mut values = BTreeMap::new();
        values.insert(CO2.to_string(), vec![3.0, 1.0, 2.0]);

        let series = TimeSeries::new(ts, values).unwrap();
        assert_eq!(series.values(CO2).unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(series.elapsed_hours()[0], 0.0);
        assert!((series.elapsed_hours()[2] - 10.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn elapsed_hours_does_not_wrap_at_one_day() {
        let t0 = at(5, 0);
        let t1 = t0 + chrono::Duration::hours(30);
        assert!((elapsed_hours_between(t0, t1) - 30.0).abs() < 1e-12);
    }

    #[test]
    fn time_series_rejects_ragged_columns() {
        let mut values = BTreeMap::new();
        values.insert(TVOC.to_string(), vec![1.0]);
        let err = TimeSeries::new(vec![at(1, 0), at(1, 5)], values).unwrap_err();
        assert!(matches!(err, DecayError::SpeciesMismatch { .. }));
    }

    #[test]
    fn time_constant_only_for_decay() {
        assert_eq!(DecayParams::new(1.0, -0.5, 0.0).time_constant(), Some(2.0));
        assert_eq!(DecayParams::new(1.0, 0.1, 0.0).time_constant(), None);
    }

    #[test]
    fn window_must_end_after_start() {
        assert!(WindowSpec::new(at(6, 0), at(5, 0), false).validate().is_err());
        assert!(WindowSpec::new(at(5, 0), at(6, 0), true).validate().is_ok());
    }
}
