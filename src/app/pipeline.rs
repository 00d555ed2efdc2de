//! Shared batch logic used by the `analyze` command.
//!
//! Keeping this in one place avoids mixing the workflow with presentation:
//! windows -> load events -> fit + rescale every (event, species) -> align
//!
//! Failures are isolated. A window that cannot be loaded produces no event;
//! a species that cannot be fitted or rescaled only affects its own pair.
//! Everything is collected into [`BatchReport`] instead of aborting.

use log::{info, warn};
use rayon::prelude::*;

use crate::data::MeasurementSource;
use crate::domain::{AlignMode, CalibrationCoefficients, DecayParams, WindowSpec};
use crate::error::DecayError;
use crate::event::DecayEvent;
use crate::fit::{FitOptions, cutoffs, estimate_seed, min_index};

/// How starting points for the optimizer are chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeedChoice {
    /// Use the same caller-supplied guess for every pair.
    Fixed(DecayParams),
    /// Estimate a guess from each pair's data.
    Estimate,
}

/// Settings for one batch run.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub location_id: String,
    pub coefs: CalibrationCoefficients,
    pub species: Vec<String>,
    pub seed: SeedChoice,
    pub fit_options: FitOptions,
    pub align_mode: AlignMode,
}

/// A window that could not become an event.
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub window: WindowSpec,
    pub error: DecayError,
}

/// An (event, species) pair that could not be fitted or rescaled.
#[derive(Debug, Clone)]
pub struct PairFailure {
    pub event: String,
    pub species: String,
    pub error: DecayError,
}

/// Everything a batch produced, successes and failures alike.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub events: Vec<DecayEvent>,
    pub load_failures: Vec<LoadFailure>,
    pub pair_failures: Vec<PairFailure>,
    pub min_index: Option<usize>,
    pub cutoffs: Vec<usize>,
}

impl BatchReport {
    pub fn failure_count(&self) -> usize {
        self.load_failures.len() + self.pair_failures.len()
    }

    pub fn failure_messages(&self) -> Vec<String> {
        let loads = self
            .load_failures
            .iter()
            .map(|f| format!("{}: {}", f.window.display_label(), f.error));
        let pairs = self
            .pair_failures
            .iter()
            .map(|f| format!("{} / {}: {}", f.event, f.species, f.error));
        loads.chain(pairs).collect()
    }
}

/// Load every window, keeping going past failures.
pub fn load_events(
    source: &dyn MeasurementSource,
    config: &AnalysisConfig,
    windows: &[WindowSpec],
) -> (Vec<DecayEvent>, Vec<LoadFailure>) {
    let mut events = Vec::with_capacity(windows.len());
    let mut failures = Vec::new();
    for window in windows {
        match DecayEvent::load(source, &config.location_id, window.clone(), config.coefs) {
            Ok(event) => events.push(event),
            Err(error) => {
                warn!("Skipping window {}: {error}", window.display_label());
                failures.push(LoadFailure {
                    window: window.clone(),
                    error,
                });
            }
        }
    }
    (events, failures)
}

/// Fit and rescale every requested species of every event.
///
/// Events are processed in parallel; species within one event run in order.
pub fn rescale_all(events: &mut [DecayEvent], species: &[String], seed: SeedChoice, opts: &FitOptions) -> Vec<PairFailure> {
    events
        .par_iter_mut()
        .flat_map_iter(|event| {
            species
                .iter()
                .filter_map(|s| {
                    rescale_pair(event, s, seed, opts).err().map(|error| {
                        warn!("{} / {s}: {error}", event.label());
                        PairFailure {
                            event: event.label(),
                            species: s.clone(),
                            error,
                        }
                    })
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

fn rescale_pair(event: &mut DecayEvent, species: &str, seed: SeedChoice, opts: &FitOptions) -> Result<(), DecayError> {
    let seed = resolve_seed(event, species, seed)?;
    event.rescale(species, seed, opts)?;
    Ok(())
}

/// Concrete starting point for one pair.
pub fn resolve_seed(event: &DecayEvent, species: &str, seed: SeedChoice) -> Result<DecayParams, DecayError> {
    match seed {
        SeedChoice::Fixed(p) => Ok(p),
        SeedChoice::Estimate => {
            let values = event
                .series()
                .values(species)
                .ok_or_else(|| DecayError::UnknownSpecies {
                    species: species.to_string(),
                })?;
            estimate_seed(event.series().elapsed_hours(), values).map_err(|f| f.for_species(species))
        }
    }
}

/// Execute the full batch: load, fit/rescale, align.
pub fn run_batch(source: &dyn MeasurementSource, config: &AnalysisConfig, windows: &[WindowSpec]) -> BatchReport {
    let (mut events, load_failures) = load_events(source, config, windows);
    info!("Loaded {}/{} windows.", events.len(), windows.len());

    let pair_failures = rescale_all(&mut events, &config.species, config.seed, &config.fit_options);

    let min_index = min_index(&events);
    let cutoffs = cutoffs(&events, config.align_mode);

    BatchReport {
        events,
        load_failures,
        pair_failures,
        min_index,
        cutoffs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::data::{SpeciesProfile, SyntheticSource};
    use crate::domain::{CO2, TVOC};

    fn window(day: u32, start_h: u32, stop_h: u32, open: bool) -> WindowSpec {
        WindowSpec::new(
            Utc.with_ymd_and_hms(2024, 11, day, start_h, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 11, day, stop_h, 0, 0).unwrap(),
            open,
        )
    }

    fn config(seed: SeedChoice) -> AnalysisConfig {
        AnalysisConfig {
            location_id: "80176".to_string(),
            coefs: CalibrationCoefficients::new(1.05, -12.0),
            species: vec![CO2.to_string(), TVOC.to_string()],
            seed,
            fit_options: FitOptions::default(),
            align_mode: AlignMode::Samples,
        }
    }

    #[test]
    fn one_degenerate_pair_does_not_block_siblings() {
        let windows = vec![window(19, 6, 11, false), window(20, 6, 10, false), window(22, 6, 9, true)];
        let src = SyntheticSource::kitchen(11).with_override("20241120T060000Z", TVOC, SpeciesProfile::flat(88.0));

        let report = run_batch(&src, &config(SeedChoice::Estimate), &windows);

        assert_eq!(report.events.len(), 3);
        assert!(report.load_failures.is_empty());
        assert_eq!(report.pair_failures.len(), 1);
        let failure = &report.pair_failures[0];
        assert_eq!(failure.species, TVOC);
        assert_eq!(failure.event, report.events[1].label());
        assert!(matches!(failure.error, DecayError::FitConvergence { .. }));

        for (i, event) in report.events.iter().enumerate() {
            assert!(event.rescaled(CO2).is_some(), "event {i} co2");
            if i != 1 {
                assert!(event.rescaled(TVOC).is_some(), "event {i} tvoc");
            }
        }
        assert!(report.events[1].rescaled(TVOC).is_none());
    }

    #[test]
    fn failed_window_is_reported_and_others_continue() {
        let windows = vec![window(19, 6, 11, false), window(21, 14, 17, false)];
        let src = SyntheticSource::kitchen(3).with_outage("20241121T140000Z");

        let report = run_batch(&src, &config(SeedChoice::Fixed(DecayParams::new(500.0, -0.5, 400.0))), &windows);

        assert_eq!(report.events.len(), 1);
        assert_eq!(report.load_failures.len(), 1);
        assert!(matches!(report.load_failures[0].error, DecayError::EmptyWindow { .. }));
        assert_eq!(report.failure_messages().len(), report.failure_count());
    }

    #[test]
    fn alignment_uses_shortest_event() {
        // 5 min sampling: 61, 49 and 37 samples.
        let windows = vec![window(19, 6, 11, false), window(20, 6, 10, false), window(22, 6, 9, true)];
        let src = SyntheticSource::kitchen(5);
        let report = run_batch(&src, &config(SeedChoice::Estimate), &windows);
        assert_eq!(report.min_index, Some(36));
        assert_eq!(report.cutoffs, vec![37, 37, 37]);
    }
}
