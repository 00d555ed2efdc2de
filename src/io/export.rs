//! Render-ready exports (CSV and JSON).
//!
//! Rendering lives outside this crate; these files carry everything a plotter
//! needs: `(elapsed_hours, value, rescaled)` per species per event, already
//! cut to the aligned length, plus the fit parameters for annotation.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{AlignMode, ExpFit};
use crate::error::{AppError, EXIT_INPUT};
use crate::event::DecayEvent;

/// One species of one event, truncated to its aligned length.
#[derive(Debug, Clone, Serialize)]
pub struct RenderSeries {
    pub event: String,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub window_open: bool,
    pub species: String,
    pub elapsed_hours: Vec<f64>,
    pub values: Vec<f64>,
    /// Empty when the species could not be rescaled.
    pub rescaled: Vec<f64>,
    pub fit: Option<ExpFit>,
    pub time_constant_hours: Option<f64>,
}

/// Bundle written by `--export-json`.
#[derive(Debug, Clone, Serialize)]
pub struct RenderBundle {
    pub tool: String,
    pub location_id: String,
    pub align_mode: AlignMode,
    pub min_index: Option<usize>,
    pub series: Vec<RenderSeries>,
    pub failures: Vec<String>,
}

/// Collect render series for every event/species pair, cut to `cutoffs`.
pub fn build_render_series(events: &[DecayEvent], species: &[String], cutoffs: &[usize]) -> Vec<RenderSeries> {
    let mut out = Vec::new();
    for (event, &keep) in events.iter().zip(cutoffs) {
        let series = event.series();
        let keep = keep.min(series.len());
        for s in species {
            let Some(values) = series.values(s) else {
                continue;
            };
            let fit = event.fit_params(s).cloned();
            let rescaled = event
                .rescaled(s)
                .map(|r| r[..keep.min(r.len())].to_vec())
                .unwrap_or_default();
            out.push(RenderSeries {
                event: event.label(),
                start: event.start(),
                stop: event.stop(),
                window_open: event.ventilation_open(),
                species: s.clone(),
                elapsed_hours: series.elapsed_hours()[..keep].to_vec(),
                values: values[..keep].to_vec(),
                rescaled,
                time_constant_hours: fit.as_ref().and_then(ExpFit::time_constant),
                fit,
            });
        }
    }
    out
}

/// Write one CSV row per sample.
pub fn write_series_csv(path: &Path, series: &[RenderSeries]) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to create export CSV '{}': {e}", path.display())))?;
    write_series_csv_to(&mut file, series)
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to write export CSV: {e}")))
}

fn write_series_csv_to(out: &mut impl Write, series: &[RenderSeries]) -> std::io::Result<()> {
    writeln!(out, "event,start,window_open,species,index,elapsed_hours,value,rescaled,a,b,c")?;
    for s in series {
        let (a, b, c) = match &s.fit {
            Some(fit) => (
                format!("{:.6}", fit.params.a),
                format!("{:.8}", fit.params.b),
                format!("{:.6}", fit.params.c),
            ),
            None => (String::new(), String::new(), String::new()),
        };
        for i in 0..s.values.len() {
            let rescaled = s.rescaled.get(i).map(|v| format!("{v:.8}")).unwrap_or_default();
            writeln!(
                out,
                "{},{},{},{},{},{:.6},{:.4},{},{},{},{}",
                csv_field(&s.event),
                s.start.to_rfc3339(),
                s.window_open,
                s.species,
                i,
                s.elapsed_hours[i],
                s.values[i],
                rescaled,
                a,
                b,
                c
            )?;
        }
    }
    Ok(())
}

/// Write the bundle as pretty JSON.
pub fn write_bundle_json(path: &Path, bundle: &RenderBundle) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to create export JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, bundle)
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to write export JSON: {e}")))
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::{Duration, TimeZone};

    use crate::domain::{CO2, TimeSeries, WindowSpec};
    use crate::fit::FitOptions;
    use crate::domain::DecayParams;

    fn event(n: usize) -> DecayEvent {
        let t0 = Utc.with_ymd_and_hms(2024, 11, 19, 6, 0, 0).unwrap();
        let ts: Vec<_> = (0..n as i64).map(|i| t0 + Duration::minutes(i * 15)).collect();
        let truth = DecayParams::new(300.0, -0.8, 450.0);
        let mut values = BTreeMap::new();
        values.insert(
            CO2.to_string(),
            (0..n).map(|i| crate::models::predict(&truth, i as f64 * 0.25)).collect(),
        );
        let mut window = WindowSpec::new(t0, t0 + Duration::hours(4), true);
        window.label = Some("mon, early".to_string());
        DecayEvent::from_series(window, TimeSeries::new(ts, values).unwrap())
    }

    #[test]
    fn render_series_are_truncated_to_cutoff() {
        let mut e = event(12);
        e.rescale(CO2, DecayParams::new(250.0, -0.5, 400.0), &FitOptions::default()).unwrap();
        let series = build_render_series(&[e], &[CO2.to_string(), "tvoc".to_string()], &[5]);

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].values.len(), 5);
        assert_eq!(series[0].elapsed_hours.len(), 5);
        assert_eq!(series[0].rescaled.len(), 5);
        assert!(series[0].time_constant_hours.is_some());
    }

    #[test]
    fn csv_has_header_and_one_row_per_sample() {
        let e = event(4);
        let series = build_render_series(&[e], &[CO2.to_string()], &[4]);
        let mut buf = Vec::new();
        write_series_csv_to(&mut buf, &series).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("event,start,window_open,species"));
        assert!(lines[1].starts_with("\"mon, early\",2024-11-19T06:00:00+00:00,true,rco2,0,0.000000,750.0000,,"));
    }
}
