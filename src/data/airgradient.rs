//! AirGradient public API integration.
//!
//! Endpoints used:
//!
//! - `locations/{id}/measures/past?from=..&to=..` (historical window)
//! - `locations/{id}/measures/current` (live polling)
//!
//! The token is injected configuration (`AIRGRADIENT_TOKEN`, optionally from
//! `.env`); it is never embedded in the binary.

use std::time::Duration;

use log::{debug, info};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::Value;

use crate::data::MeasurementSource;
use crate::data::retry::{Attempt, RetryPolicy, with_retry};
use crate::domain::SampleRecord;
use crate::error::{AppError, DecayError, EXIT_INPUT};

pub const DEFAULT_BASE_URL: &str = "https://api.airgradient.com/public/api/v1/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Payload fields that are numeric but are not measurements.
const METADATA_FIELDS: &[&str] = &["locationId", "wifi", "boot", "bootCount", "firmwareVersion"];
const TIMESTAMP_FIELD: &str = "timestamp";

pub struct AirGradientClient {
    client: Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
}

impl AirGradientClient {
    pub fn new(token: impl Into<String>, timeout: Duration, retry: RetryPolicy) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
            retry,
        })
    }

    /// Build a client from `AIRGRADIENT_TOKEN` (and optional `AIRGRADIENT_BASE_URL`).
    pub fn from_env(timeout: Duration, retry: RetryPolicy) -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let token = std::env::var("AIRGRADIENT_TOKEN")
            .map_err(|_| AppError::new(EXIT_INPUT, "Missing AIRGRADIENT_TOKEN in environment (.env)."))?;
        let mut client = Self::new(token, timeout, retry)?;
        if let Ok(base) = std::env::var("AIRGRADIENT_BASE_URL") {
            client = client.with_base_url(base);
        }
        Ok(client)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base = base_url.into();
        if !base.ends_with('/') {
            base.push('/');
        }
        self.base_url = base;
        self
    }

    fn get_json(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value, DecayError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("GET {url}");

        with_retry(&self.retry, endpoint, || {
            let resp = self
                .client
                .get(&url)
                .query(&[("token", self.token.as_str())])
                .query(query)
                .send()
                .map_err(|e| Attempt::Transient(format!("request failed: {e}")))?;

            let status = resp.status();
            if !status.is_success() {
                let message = format!("request failed with status {status}");
                return Err(if is_transient_status(status) {
                    Attempt::Transient(message)
                } else {
                    Attempt::Fatal(message)
                });
            }

            resp.json::<Value>()
                .map_err(|e| Attempt::Fatal(format!("failed to parse response: {e}")))
        })
        .map_err(|message| DecayError::UpstreamFetch {
            message: format!("{endpoint}: {message}"),
        })
    }
}

impl MeasurementSource for AirGradientClient {
    fn fetch(&self, location_id: &str, from: &str, to: &str) -> Result<Vec<SampleRecord>, DecayError> {
        let endpoint = format!("locations/{location_id}/measures/past");
        let body = self.get_json(&endpoint, &[("from", from), ("to", to)])?;

        let Value::Array(items) = body else {
            return Err(DecayError::UpstreamFetch {
                message: format!("{endpoint}: expected a JSON array of records"),
            });
        };

        let records = items
            .iter()
            .enumerate()
            .map(|(index, item)| record_from_json(index, item))
            .collect::<Result<Vec<_>, _>>()?;
        info!("Fetched {} records for location {location_id} ({from} .. {to}).", records.len());
        Ok(records)
    }

    fn fetch_current(&self, location_id: &str) -> Result<SampleRecord, DecayError> {
        let endpoint = format!("locations/{location_id}/measures/current");
        let body = self.get_json(&endpoint, &[])?;
        match &body {
            Value::Array(items) => match items.first() {
                Some(item) => record_from_json(0, item),
                None => Err(DecayError::UpstreamFetch {
                    message: format!("{endpoint}: empty response"),
                }),
            },
            other => record_from_json(0, other),
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Convert one wire record into a [`SampleRecord`].
///
/// Only numeric fields become species; strings, booleans, nulls and known
/// metadata fields are dropped.
pub fn record_from_json(index: usize, value: &Value) -> Result<SampleRecord, DecayError> {
    let Value::Object(map) = value else {
        return Err(DecayError::MalformedRecord {
            index,
            message: "record is not a JSON object".to_string(),
        });
    };

    let timestamp = map
        .get(TIMESTAMP_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| DecayError::MalformedRecord {
            index,
            message: format!("missing `{TIMESTAMP_FIELD}` string"),
        })?;

    let mut record = SampleRecord::new(timestamp);
    for (key, field) in map {
        if key == TIMESTAMP_FIELD || METADATA_FIELDS.contains(&key.as_str()) {
            continue;
        }
        if let Some(v) = field.as_f64() {
            record.values.insert(key.clone(), v);
        }
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keeps_numeric_measurements_only() {
        let raw = serde_json::json!({
            "locationId": 80176,
            "locationName": "Kitchen",
            "timestamp": "2024-11-19T05:45:00.000Z",
            "rco2": 812,
            "tvoc": 143.5,
            "pm10": null,
            "wifi": -61
        });
        let record = record_from_json(0, &raw).unwrap();
        assert_eq!(record.timestamp, "2024-11-19T05:45:00.000Z");
        assert_eq!(record.values.get("rco2"), Some(&812.0));
        assert_eq!(record.values.get("tvoc"), Some(&143.5));
        assert!(!record.values.contains_key("pm10"));
        assert!(!record.values.contains_key("wifi"));
        assert!(!record.values.contains_key("locationId"));
    }

    #[test]
    fn record_without_timestamp_is_malformed() {
        let raw = serde_json::json!({ "rco2": 500 });
        let err = record_from_json(4, &raw).unwrap_err();
        assert!(matches!(err, DecayError::MalformedRecord { index: 4, .. }));
    }

    #[test]
    fn only_throttling_and_server_errors_are_transient() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let client = AirGradientClient::new("t", DEFAULT_TIMEOUT, RetryPolicy::none())
            .unwrap()
            .with_base_url("http://localhost:9000/api");
        assert_eq!(client.base_url, "http://localhost:9000/api/");
    }
}
