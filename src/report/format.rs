//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays clean and testable
//! - output changes are localized (important for snapshot tests)

use crate::app::pipeline::{AnalysisConfig, BatchReport, SeedChoice};
use crate::domain::ExpFit;
use crate::report::{FitRow, VentilationSummary};

/// Format the batch header (inputs + alignment).
pub fn format_batch_summary(report: &BatchReport, config: &AnalysisConfig, windows_total: usize) -> String {
    let mut out = String::new();

    out.push_str("=== aq - Decay Analysis (AirGradient) ===\n");
    out.push_str(&format!("Location: {}\n", config.location_id));
    out.push_str(&format!(
        "CO2 calibration: slope={:.4} intercept={:.4}\n",
        config.coefs.slope, config.coefs.intercept
    ));
    out.push_str(&format!("Species: {}\n", config.species.join(", ")));
    match config.seed {
        SeedChoice::Fixed(p) => out.push_str(&format!("Seed: a={} b={} c={}\n", p.a, p.b, p.c)),
        SeedChoice::Estimate => out.push_str("Seed: estimated per series\n"),
    }
    out.push_str(&format!(
        "Events: {}/{} loaded | align={:?} | min_index={}\n",
        report.events.len(),
        windows_total,
        config.align_mode,
        report
            .min_index
            .map(|i| i.to_string())
            .unwrap_or_else(|| "-".to_string()),
    ));
    out.push('\n');

    out
}

/// Table of fitted parameters, one row per (event, species).
pub fn format_fit_table(rows: &[FitRow]) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!(
            "{:<18} {:<6} {:<6} {:>5} {:>10} {:>9} {:>9} {:>8} {:>8} {:>5}",
            "event", "window", "species", "n", "a", "b", "c", "tau_h", "rmse", "iter"
        ),
    );
    push_line(
        &mut out,
        format!(
            "{:-<18} {:-<6} {:-<6} {:->5} {:->10} {:->9} {:->9} {:->8} {:->8} {:->5}",
            "", "", "", "", "", "", "", "", "", ""
        ),
    );

    for r in rows {
        push_line(
            &mut out,
            format!(
                "{:<18} {:<6} {:<6} {:>5} {:>10.2} {:>9.4} {:>9.2} {:>8} {:>8.3} {:>5}",
                truncate(&r.event, 18),
                window_word(r.window_open),
                truncate(&r.species, 6),
                r.n,
                r.params.a,
                r.params.b,
                r.params.c,
                fmt_opt(r.time_constant, 3),
                r.rmse,
                r.iterations,
            ),
        );
    }

    out
}

/// Mean time constants for open vs closed windows.
pub fn format_ventilation(summaries: &[VentilationSummary]) -> String {
    let mut out = String::new();
    out.push_str("Ventilation comparison (mean tau, hours):\n");
    for s in summaries {
        out.push_str(&format!(
            "- {:<6} open={} (n={}) closed={} (n={}) closed/open={}\n",
            s.species,
            fmt_opt(s.open_mean_tau, 3),
            s.open_n,
            fmt_opt(s.closed_mean_tau, 3),
            s.closed_n,
            fmt_opt(s.speedup(), 2),
        ));
    }
    out
}

/// Every failure collected during a batch.
pub fn format_failures(messages: &[String]) -> String {
    if messages.is_empty() {
        return "No failures.\n".to_string();
    }
    let mut out = format!("Failures ({}):\n", messages.len());
    for m in messages {
        out.push_str(&format!("- {m}\n"));
    }
    out
}

/// Single-series fit detail with uncertainties.
pub fn format_fit_detail(species: &str, fit: &ExpFit) -> String {
    let se = fit.std_errors();
    let p = fit.params;
    let mut out = String::new();
    out.push_str(&format!("{species}: n={} iterations={}\n", fit.n, fit.iterations));
    out.push_str(&format!("- a = {:.4} ± {}\n", p.a, fmt_se(se[0])));
    out.push_str(&format!("- b = {:.6} ± {} (1/h)\n", p.b, fmt_se(se[1])));
    out.push_str(&format!("- c = {:.4} ± {}\n", p.c, fmt_se(se[2])));
    match fit.time_constant() {
        Some(tau) => out.push_str(&format!("- tau = {tau:.3} h ({:.1} min)\n", tau * 60.0)),
        None => out.push_str("- tau = - (curve does not decay)\n"),
    }
    out.push_str(&format!("- rmse = {:.4} | sse = {:.4}\n", fit.rmse, fit.sse));
    out
}

/// One live polling line.
pub fn format_live_reading(timestamp: &str, raw: f64, calibrated: i64) -> String {
    format!("{timestamp} rco2 raw={raw:.1} calibrated={calibrated}")
}

fn push_line(out: &mut String, line: String) {
    out.push_str(line.trim_end());
    out.push('\n');
}

fn window_word(open: bool) -> &'static str {
    if open { "open" } else { "closed" }
}

fn fmt_opt(v: Option<f64>, decimals: usize) -> String {
    match v {
        Some(x) => format!("{x:.decimals$}"),
        None => "-".to_string(),
    }
}

fn fmt_se(v: f64) -> String {
    if v.is_finite() { format!("{v:.4}") } else { "n/a".to_string() }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
