//! Time-series loading.
//!
//! Turns the records of one upstream window into a calibrated [`TimeSeries`]:
//!
//! - the species set comes from the first record; later records must carry it
//! - only the CO2 channel is calibrated (the only species with a known
//!   linear correction); other species pass through unchanged
//! - timestamps are parsed, sorted, and converted to true elapsed hours

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;

use crate::calibration::try_apply_sequence;
use crate::data::MeasurementSource;
use crate::domain::{CO2, CalibrationCoefficients, SampleRecord, TimeSeries};
use crate::error::DecayError;

/// Wire format of query window bounds.
pub const WINDOW_BOUND_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Format an instant as a window bound token (`YYYYMMDDTHHMMSSZ`).
pub fn format_window_bound(instant: DateTime<Utc>) -> String {
    instant.format(WINDOW_BOUND_FORMAT).to_string()
}

/// Parse a window bound token (`YYYYMMDDTHHMMSSZ`).
pub fn parse_window_bound(token: &str) -> Result<DateTime<Utc>, DecayError> {
    NaiveDateTime::parse_from_str(token.trim(), WINDOW_BOUND_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| DecayError::InvalidWindow {
            message: format!("bad window bound `{token}` (expected YYYYMMDDTHHMMSSZ): {e}"),
        })
}

/// Parse a payload timestamp.
///
/// Accepts RFC 3339 (with or without fractional seconds, `Z` or an offset),
/// offset-less ISO-8601 (taken as UTC) and the compact bound token.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", WINDOW_BOUND_FORMAT] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Fetch one window from `source` and build its calibrated time series.
pub fn load_time_series(
    source: &dyn MeasurementSource,
    location_id: &str,
    coefs: CalibrationCoefficients,
    from: &str,
    to: &str,
) -> Result<TimeSeries, DecayError> {
    let start = parse_window_bound(from)?;
    let stop = parse_window_bound(to)?;
    let records = source.fetch(location_id, from, to)?;
    if records.is_empty() {
        return Err(DecayError::EmptyWindow { start, stop });
    }
    debug!("Loaded {} records for {from} .. {to}.", records.len());
    series_from_records(&records, coefs)
}

/// Build a calibrated time series from already-fetched records.
pub fn series_from_records(
    records: &[SampleRecord],
    coefs: CalibrationCoefficients,
) -> Result<TimeSeries, DecayError> {
    let Some(first) = records.first() else {
        return Err(DecayError::MalformedRecord {
            index: 0,
            message: "no records".to_string(),
        });
    };

    let species: Vec<&String> = first.values.keys().collect();
    let mut columns: BTreeMap<String, Vec<f64>> = species
        .iter()
        .map(|s| ((*s).clone(), Vec::with_capacity(records.len())))
        .collect();
    let mut timestamps = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let ts = parse_timestamp(&record.timestamp).ok_or_else(|| DecayError::MalformedRecord {
            index,
            message: format!("unparseable timestamp `{}`", record.timestamp),
        })?;
        timestamps.push(ts);

        for s in &species {
            let value = record
                .values
                .get(s.as_str())
                .copied()
                .ok_or_else(|| DecayError::SpeciesMismatch {
                    index,
                    species: (*s).clone(),
                })?;
            if let Some(column) = columns.get_mut(s.as_str()) {
                column.push(value);
            }
        }
    }

    if let Some(co2) = columns.get_mut(CO2) {
        let calibrated = try_apply_sequence(coefs, co2)?;
        *co2 = calibrated.into_iter().map(|v| v as f64).collect();
    }

    TimeSeries::new(timestamps, columns)
}
