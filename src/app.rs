//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and starts logging
//! - builds the measurement source (AirGradient API or synthetic)
//! - runs the batch or single-range fits
//! - prints reports/plots
//! - writes optional exports

use std::thread;
use std::time::Duration;

use clap::Parser;
use log::{info, warn};

use crate::calibration::{CoefficientSource, FixedCoefficients, try_apply_scalar};
use crate::cli::{AnalyzeArgs, Command, FitArgs, LiveArgs, SeedArgs, SourceArgs};
use crate::data::{AirGradientClient, MeasurementSource, RetryPolicy, SyntheticSource};
use crate::domain::{CO2, CalibrationCoefficients, DecayParams, WindowSpec};
use crate::error::{AppError, DecayError, EXIT_COMPUTE, EXIT_DATA, EXIT_INPUT};
use crate::event::DecayEvent;
use crate::fit::FitOptions;
use crate::io::{RenderBundle, build_render_series, parse_instant, read_windows_json, write_bundle_json, write_series_csv};

pub mod pipeline;

use pipeline::{AnalysisConfig, SeedChoice};

/// Entry point for the `aq` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();
    crate::logging::init_logging(&cli.log_level)?;

    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Fit(args) => handle_fit(args),
        Command::Live(args) => handle_live(args),
    }
}

fn handle_analyze(args: AnalyzeArgs) -> Result<(), AppError> {
    let windows = read_windows_json(&args.windows)?;
    let source = build_source(&args.source)?;
    let config = AnalysisConfig {
        location_id: args.source.location_id.clone(),
        coefs: coefficients(&args.source)?,
        species: args.species.clone(),
        seed: seed_choice(&args.seed),
        fit_options: fit_options(&args.seed),
        align_mode: args.align,
    };

    let report = pipeline::run_batch(source.as_ref(), &config, &windows);

    println!("{}", crate::report::format_batch_summary(&report, &config, windows.len()));
    let rows = crate::report::fit_rows(&report.events, &config.species);
    println!("{}", crate::report::format_fit_table(&rows));
    println!(
        "{}",
        crate::report::format_ventilation(&crate::report::compare_ventilation(&rows, &config.species))
    );
    let failures = report.failure_messages();
    println!("{}", crate::report::format_failures(&failures));

    let series = build_render_series(&report.events, &config.species, &report.cutoffs);

    if args.plot {
        for s in &config.species {
            let of_species: Vec<_> = series.iter().filter(|r| &r.species == s).cloned().collect();
            println!("[{s}]");
            println!("{}", crate::plot::render_overlay(&of_species, args.width, args.height));
        }
    }

    if let Some(path) = &args.export_csv {
        write_series_csv(path, &series)?;
        info!("Wrote {}", path.display());
    }
    if let Some(path) = &args.export_json {
        let bundle = RenderBundle {
            tool: format!("aq {}", env!("CARGO_PKG_VERSION")),
            location_id: config.location_id.clone(),
            align_mode: config.align_mode,
            min_index: report.min_index,
            series,
            failures,
        };
        write_bundle_json(path, &bundle)?;
        info!("Wrote {}", path.display());
    }

    if report.events.is_empty() {
        return Err(AppError::new(EXIT_DATA, "No decay window could be loaded."));
    }
    if rows.is_empty() {
        return Err(AppError::new(EXIT_COMPUTE, "No (event, species) pair could be fitted."));
    }
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let start = parse_instant(&args.from)
        .ok_or_else(|| AppError::new(EXIT_INPUT, format!("Invalid --from instant '{}'.", args.from)))?;
    let stop = parse_instant(&args.to)
        .ok_or_else(|| AppError::new(EXIT_INPUT, format!("Invalid --to instant '{}'.", args.to)))?;

    let source = build_source(&args.source)?;
    let coefs = coefficients(&args.source)?;
    let mut event = DecayEvent::load(
        source.as_ref(),
        &args.source.location_id,
        WindowSpec::new(start, stop, false),
        coefs,
    )?;
    println!(
        "=== aq - Decay Fit (AirGradient) ===\nLocation: {} | {} .. {} | n={}\n",
        args.source.location_id,
        event.start().to_rfc3339(),
        event.stop().to_rfc3339(),
        event.len()
    );

    let seed = seed_choice(&args.seed);
    let opts = fit_options(&args.seed);
    let mut last_error: Option<DecayError> = None;
    let mut fitted = 0usize;

    for s in &args.species {
        let fit = pipeline::resolve_seed(&event, s, seed).and_then(|p| event.fit(s, p, &opts).cloned());
        let fit = match fit {
            Ok(fit) => fit,
            Err(e) => {
                warn!("{s}: {e}");
                println!("{s}: {e}\n");
                last_error = Some(e);
                continue;
            }
        };
        fitted += 1;
        println!("{}", crate::report::format_fit_detail(s, &fit));

        if args.plot {
            if let Some(values) = event.series().values(s) {
                println!(
                    "{}",
                    crate::plot::render_fit_plot(event.series().elapsed_hours(), values, &fit, args.width, args.height)
                );
            }
        }
    }

    match (fitted, last_error) {
        (0, Some(e)) => Err(e.into()),
        _ => Ok(()),
    }
}

fn handle_live(args: LiveArgs) -> Result<(), AppError> {
    let source = build_source(&args.source)?;
    let coefs = coefficients(&args.source)?;
    let interval = Duration::from_secs(args.interval_secs.max(1));

    let mut polled = 0u64;
    loop {
        match live_reading(source.as_ref(), &args.source.location_id, coefs) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("Live poll failed: {e}"),
        }
        polled += 1;
        if args.count.is_some_and(|n| polled >= n) {
            return Ok(());
        }
        thread::sleep(interval);
    }
}

fn live_reading(
    source: &dyn MeasurementSource,
    location_id: &str,
    coefs: CalibrationCoefficients,
) -> Result<String, DecayError> {
    let record = source.fetch_current(location_id)?;
    let raw = record.values.get(CO2).copied().ok_or_else(|| DecayError::UnknownSpecies {
        species: CO2.to_string(),
    })?;
    let calibrated = try_apply_scalar(coefs, raw)?;
    Ok(crate::report::format_live_reading(&record.timestamp, raw, calibrated))
}

fn build_source(args: &SourceArgs) -> Result<Box<dyn MeasurementSource>, AppError> {
    if args.synthetic {
        info!("Using synthetic source (seed={}).", args.synthetic_seed);
        return Ok(Box::new(SyntheticSource::kitchen(args.synthetic_seed)));
    }
    let retry = RetryPolicy {
        max_attempts: args.retries.max(1),
        ..RetryPolicy::default()
    };
    let client = AirGradientClient::from_env(Duration::from_secs(args.timeout_secs.max(1)), retry)?;
    Ok(Box::new(client))
}

fn coefficients(args: &SourceArgs) -> Result<CalibrationCoefficients, AppError> {
    let coefs = CalibrationCoefficients::new(args.slope, args.intercept);
    if !coefs.slope.is_finite() || !coefs.intercept.is_finite() {
        return Err(AppError::new(EXIT_INPUT, "Calibration slope and intercept must be finite."));
    }
    Ok(FixedCoefficients(coefs).derive_coefficients(&args.location_id)?)
}

fn seed_choice(args: &SeedArgs) -> SeedChoice {
    if args.auto_seed {
        SeedChoice::Estimate
    } else {
        SeedChoice::Fixed(DecayParams::new(args.seed_a, args.seed_b, args.seed_c))
    }
}

fn fit_options(args: &SeedArgs) -> FitOptions {
    FitOptions {
        max_iterations: args.max_iterations.max(1),
        ..FitOptions::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;

    fn analyze_args(extra: &[&str]) -> AnalyzeArgs {
        let mut argv = vec!["aq", "analyze", "--location", "80176", "--windows", "w.json"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Analyze(args) => args,
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn default_seed_is_fixed() {
        let args = analyze_args(&[]);
        assert_eq!(seed_choice(&args.seed), SeedChoice::Fixed(DecayParams::new(500.0, -0.5, 400.0)));
        assert_eq!(fit_options(&args.seed).max_iterations, 200);
    }

    #[test]
    fn auto_seed_switches_to_estimation() {
        let args = analyze_args(&["--auto-seed"]);
        assert_eq!(seed_choice(&args.seed), SeedChoice::Estimate);
    }

    #[test]
    fn non_finite_calibration_is_rejected() {
        let args = analyze_args(&["--slope", "NaN"]);
        let err = coefficients(&args.source).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_INPUT);
    }

    #[test]
    fn live_reading_calibrates_co2() {
        let source = SyntheticSource::kitchen(9);
        let coefs = CalibrationCoefficients::new(1.0, 0.5);
        let line = live_reading(&source, "80176", coefs).unwrap();
        assert!(line.contains("rco2 raw="));
        assert!(line.contains("calibrated="));
    }
}
