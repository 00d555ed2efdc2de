//! Decay window definitions (JSON).
//!
//! ```json
//! [
//!   { "start": "2024-11-19T05:45", "stop": "2024-11-19T10:55", "window_open": false },
//!   { "start": "2024-11-22T05:40:00Z", "stop": "2024-11-22T09:25:00Z", "window_open": true, "label": "fri" }
//! ]
//! ```
//!
//! Instants with an offset are taken as-is. Offset-less instants are wall-clock
//! times in the local zone and are normalized to UTC.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::domain::WindowSpec;
use crate::error::{AppError, EXIT_INPUT};

#[derive(Debug, Deserialize)]
struct WindowEntry {
    start: String,
    stop: String,
    window_open: bool,
    #[serde(default)]
    label: Option<String>,
}

/// Read and validate a windows file.
pub fn read_windows_json(path: &Path) -> Result<Vec<WindowSpec>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to open windows file '{}': {e}", path.display())))?;
    let entries: Vec<WindowEntry> = serde_json::from_reader(file)
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Invalid windows JSON: {e}")))?;
    windows_from_entries(entries)
}

/// Parse windows from a JSON string.
pub fn parse_windows_json(raw: &str) -> Result<Vec<WindowSpec>, AppError> {
    let entries: Vec<WindowEntry> =
        serde_json::from_str(raw).map_err(|e| AppError::new(EXIT_INPUT, format!("Invalid windows JSON: {e}")))?;
    windows_from_entries(entries)
}

fn windows_from_entries(entries: Vec<WindowEntry>) -> Result<Vec<WindowSpec>, AppError> {
    if entries.is_empty() {
        return Err(AppError::new(EXIT_INPUT, "Windows file defines no windows."));
    }
    entries
        .into_iter()
        .enumerate()
        .map(|(i, e)| {
            let start = parse_instant(&e.start)
                .ok_or_else(|| AppError::new(EXIT_INPUT, format!("Window {i}: bad start `{}`.", e.start)))?;
            let stop = parse_instant(&e.stop)
                .ok_or_else(|| AppError::new(EXIT_INPUT, format!("Window {i}: bad stop `{}`.", e.stop)))?;
            let window = WindowSpec {
                start,
                stop,
                ventilation_open: e.window_open,
                label: e.label,
            };
            window
                .validate()
                .map_err(|err| AppError::new(EXIT_INPUT, format!("Window {i}: {err}")))?;
            Ok(window)
        })
        .collect()
}

/// Parse a window instant, normalizing to UTC.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_offset_and_local_instants() {
        let raw = r#"[
            { "start": "2024-11-22T05:40:00Z", "stop": "2024-11-22T09:25:00Z", "window_open": true, "label": "fri" },
            { "start": "2024-11-19T05:45", "stop": "2024-11-19T10:55", "window_open": false }
        ]"#;
        let windows = parse_windows_json(raw).unwrap();
        assert_eq!(windows.len(), 2);
        assert!(windows[0].ventilation_open);
        assert_eq!(windows[0].label.as_deref(), Some("fri"));
        assert_eq!(windows[0].start.to_rfc3339(), "2024-11-22T05:40:00+00:00");
        assert_eq!(windows[1].stop - windows[1].start, chrono::Duration::minutes(310));
    }

    #[test]
    fn rejects_inverted_window() {
        let raw = r#"[{ "start": "2024-11-22T09:25:00Z", "stop": "2024-11-22T05:40:00Z", "window_open": true }]"#;
        let err = parse_windows_json(raw).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_INPUT);
    }

    #[test]
    fn rejects_empty_list() {
        assert!(parse_windows_json("[]").is_err());
    }
}
