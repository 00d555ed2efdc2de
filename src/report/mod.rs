//! Reporting utilities: per-pair fit rows and ventilation comparisons.

use crate::domain::DecayParams;
use crate::event::DecayEvent;

pub mod format;

pub use format::*;

/// One fitted (event, species) pair, flattened for tables.
#[derive(Debug, Clone)]
pub struct FitRow {
    pub event: String,
    pub window_open: bool,
    pub species: String,
    pub n: usize,
    pub params: DecayParams,
    pub std_errors: [f64; 3],
    pub time_constant: Option<f64>,
    pub rmse: f64,
    pub iterations: usize,
}

/// Mean time constant per ventilation state for one species.
#[derive(Debug, Clone, PartialEq)]
pub struct VentilationSummary {
    pub species: String,
    pub open_mean_tau: Option<f64>,
    pub open_n: usize,
    pub closed_mean_tau: Option<f64>,
    pub closed_n: usize,
}

impl VentilationSummary {
    /// `closed / open` mean time constant; above 1 means opening the window helps.
    pub fn speedup(&self) -> Option<f64> {
        match (self.open_mean_tau, self.closed_mean_tau) {
            (Some(open), Some(closed)) if open > 0.0 => Some(closed / open),
            _ => None,
        }
    }
}

/// Rows for every pair that has a fit, in event then species order.
pub fn fit_rows(events: &[DecayEvent], species: &[String]) -> Vec<FitRow> {
    let mut rows = Vec::new();
    for event in events {
        for s in species {
            let Some(fit) = event.fit_params(s) else {
                continue;
            };
            rows.push(FitRow {
                event: event.label(),
                window_open: event.ventilation_open(),
                species: s.clone(),
                n: fit.n,
                params: fit.params,
                std_errors: fit.std_errors(),
                time_constant: fit.time_constant(),
                rmse: fit.rmse,
                iterations: fit.iterations,
            });
        }
    }
    rows
}

/// Average time constants by ventilation state. Non-decaying fits are ignored.
pub fn compare_ventilation(rows: &[FitRow], species: &[String]) -> Vec<VentilationSummary> {
    species
        .iter()
        .map(|s| {
            let taus = |open: bool| -> Vec<f64> {
                rows.iter()
                    .filter(|r| &r.species == s && r.window_open == open)
                    .filter_map(|r| r.time_constant)
                    .collect()
            };
            let open = taus(true);
            let closed = taus(false);
            VentilationSummary {
                species: s.clone(),
                open_mean_tau: mean(&open),
                open_n: open.len(),
                closed_mean_tau: mean(&closed),
                closed_n: closed.len(),
            }
        })
        .collect()
}

fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        None
    } else {
        Some(xs.iter().sum::<f64>() / xs.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(species: &str, open: bool, b: f64) -> FitRow {
        let params = DecayParams::new(100.0, b, 400.0);
        FitRow {
            event: "e".to_string(),
            window_open: open,
            species: species.to_string(),
            n: 10,
            params,
            std_errors: [0.0; 3],
            time_constant: params.time_constant(),
            rmse: 1.0,
            iterations: 5,
        }
    }

    #[test]
    fn ventilation_means_split_by_state() {
        let rows = vec![
            row("rco2", true, -2.0),
            row("rco2", true, -1.0),
            row("rco2", false, -0.25),
            row("rco2", false, 0.1),
            row("tvoc", false, -0.5),
        ];
        let summary = compare_ventilation(&rows, &["rco2".to_string(), "tvoc".to_string()]);

        assert_eq!(summary[0].open_n, 2);
        assert!((summary[0].open_mean_tau.unwrap() - 0.75).abs() < 1e-12);
        // The growing fit has no time constant.
        assert_eq!(summary[0].closed_n, 1);
        assert!((summary[0].speedup().unwrap() - 4.0 / 0.75).abs() < 1e-12);

        assert_eq!(summary[1].open_mean_tau, None);
        assert_eq!(summary[1].speedup(), None);
    }
}
