//! Decay events.
//!
//! A `DecayEvent` owns the calibrated time series of one ventilation episode
//! and tracks, per species, how far the analysis has progressed:
//!
//! ```text
//! (absent) Unfit --fit--> Fitted --rescale--> Rescaled
//!                  ^--------- fit / rescale overwrite ---------'
//! ```
//!
//! Rescaling reads the fit it was derived from, so a rescaled curve can never
//! be paired with parameters from a different fit.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::data::MeasurementSource;
use crate::domain::{CalibrationCoefficients, DecayParams, ExpFit, TimeSeries, WindowSpec};
use crate::error::DecayError;
use crate::fit::exponential::{FitOptions, fit_exponential};
use crate::fit::rescale::rescale_values;
use crate::io::{format_window_bound, load_time_series};

/// Analysis progress of one species within an event.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeciesState {
    Fitted(ExpFit),
    Rescaled { fit: ExpFit, values: Vec<f64> },
}

impl SpeciesState {
    pub fn fit(&self) -> &ExpFit {
        match self {
            SpeciesState::Fitted(fit) => fit,
            SpeciesState::Rescaled { fit, .. } => fit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecayEvent {
    window: WindowSpec,
    series: TimeSeries,
    states: BTreeMap<String, SpeciesState>,
}

impl DecayEvent {
    /// Fetch and calibrate the window's data.
    ///
    /// Fails (and no event exists) when the window is invalid, the upstream
    /// fetch fails, or the window holds no records.
    pub fn load(
        source: &dyn MeasurementSource,
        location_id: &str,
        window: WindowSpec,
        coefs: CalibrationCoefficients,
    ) -> Result<Self, DecayError> {
        window.validate()?;
        let from = format_window_bound(window.start);
        let to = format_window_bound(window.stop);
        let series = load_time_series(source, location_id, coefs, &from, &to)?;
        debug!(
            "Loaded event {} ({} samples, open={}).",
            window.display_label(),
            series.len(),
            window.ventilation_open
        );
        Ok(Self::from_series(window, series))
    }

    /// Wrap an already-loaded series.
    pub fn from_series(window: WindowSpec, series: TimeSeries) -> Self {
        Self {
            window,
            series,
            states: BTreeMap::new(),
        }
    }

    pub fn window(&self) -> &WindowSpec {
        &self.window
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.window.start
    }

    pub fn stop(&self) -> DateTime<Utc> {
        self.window.stop
    }

    pub fn ventilation_open(&self) -> bool {
        self.window.ventilation_open
    }

    pub fn duration(&self) -> Duration {
        self.window.stop - self.window.start
    }

    pub fn label(&self) -> String {
        self.window.display_label()
    }

    pub fn series(&self) -> &TimeSeries {
        &self.series
    }

    /// Number of samples in the event's series.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn state(&self, species: &str) -> Option<&SpeciesState> {
        self.states.get(species)
    }

    pub fn fit_params(&self, species: &str) -> Option<&ExpFit> {
        self.states.get(species).map(SpeciesState::fit)
    }

    pub fn rescaled(&self, species: &str) -> Option<&[f64]> {
        match self.states.get(species) {
            Some(SpeciesState::Rescaled { values, .. }) => Some(values.as_slice()),
            _ => None,
        }
    }

    /// Fit the relaxation model to one species, replacing any earlier state.
    pub fn fit(&mut self, species: &str, seed: DecayParams, opts: &FitOptions) -> Result<&ExpFit, DecayError> {
        let values = self.species_values(species)?;
        let fit = fit_exponential(self.series.elapsed_hours(), values, seed, opts)
            .map_err(|f| f.for_species(species))?;
        debug!(
            "Fitted {species} for {}: a={:.3} b={:.5} c={:.3} ({} iterations).",
            self.label(),
            fit.params.a,
            fit.params.b,
            fit.params.c,
            fit.iterations
        );
        self.states.insert(species.to_string(), SpeciesState::Fitted(fit));
        Ok(self.states[species].fit())
    }

    /// Fit, then normalize to `(y - c) / a`.
    ///
    /// On failure the species' previous state is left untouched.
    pub fn rescale(&mut self, species: &str, seed: DecayParams, opts: &FitOptions) -> Result<&[f64], DecayError> {
        let values = self.species_values(species)?;
        let fit = fit_exponential(self.series.elapsed_hours(), values, seed, opts)
            .map_err(|f| f.for_species(species))?;
        let rescaled = rescale_values(species, values, &fit)?;
        self.store_rescaled(species, fit, rescaled)
    }

    /// Normalize using the species' existing fit.
    pub fn rescale_fitted(&mut self, species: &str) -> Result<&[f64], DecayError> {
        let values = self.species_values(species)?;
        let fit = self
            .fit_params(species)
            .cloned()
            .ok_or_else(|| DecayError::NotFitted {
                species: species.to_string(),
            })?;
        let rescaled = rescale_values(species, values, &fit)?;
        self.store_rescaled(species, fit, rescaled)
    }

    fn store_rescaled(&mut self, species: &str, fit: ExpFit, values: Vec<f64>) -> Result<&[f64], DecayError> {
        self.states
            .insert(species.to_string(), SpeciesState::Rescaled { fit, values });
        self.rescaled(species).ok_or_else(|| DecayError::NotFitted {
            species: species.to_string(),
        })
    }

    fn species_values(&self, species: &str) -> Result<&[f64], DecayError> {
        self.series
            .values(species)
            .ok_or_else(|| DecayError::UnknownSpecies {
                species: species.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SpeciesProfile, SyntheticSource};
    use crate::domain::{CO2, TVOC};
    use chrono::TimeZone;

    fn window(day: u32) -> WindowSpec {
        WindowSpec::new(
            Utc.with_ymd_and_hms(2024, 11, day, 6, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 11, day, 11, 0, 0).unwrap(),
            false,
        )
    }

    fn co2_seed() -> DecayParams {
        DecayParams::new(500.0, -0.5, 400.0)
    }

    #[test]
    fn loads_and_exposes_window_metadata() {
        let src = SyntheticSource::kitchen(5);
        let event = DecayEvent::load(&src, "80176", window(19), CalibrationCoefficients::IDENTITY).unwrap();
        assert_eq!(event.len(), 61);
        assert_eq!(event.duration(), Duration::hours(5));
        assert!(!event.ventilation_open());
        assert!(event.fit_params(CO2).is_none());
        assert!(event.rescaled(CO2).is_none());
    }

    #[test]
    fn empty_window_constructs_no_event() {
        let src = SyntheticSource::kitchen(5).with_outage("20241119T060000Z");
        let err = DecayEvent::load(&src, "80176", window(19), CalibrationCoefficients::IDENTITY).unwrap_err();
        assert!(matches!(err, DecayError::EmptyWindow { .. }));
    }

    #[test]
    fn rescale_normalizes_to_unit_amplitude_and_zero_baseline() {
        let src = SyntheticSource::new(1, Duration::minutes(5))
            .with_species(TVOC, SpeciesProfile::new(DecayParams::new(120.0, -0.9, 80.0), 0.0));
        let mut event = DecayEvent::load(&src, "1", window(20), CalibrationCoefficients::IDENTITY).unwrap();

        event.rescale(TVOC, DecayParams::new(100.0, -0.5, 70.0), &FitOptions::default()).unwrap();
        let fit = event.fit_params(TVOC).unwrap().clone();
        let values = event.series().values(TVOC).unwrap().to_vec();
        let rescaled = event.rescaled(TVOC).unwrap();

        let expected0 = (values[0] - fit.params.c) / fit.params.a;
        assert!((rescaled[0] - expected0).abs() < 1e-12);
        assert!((rescaled[0] - 1.0).abs() < 1e-6);
        // Five hours at tau ~ 1.1h: within e^-4.5 of the asymptote.
        assert!(rescaled[rescaled.len() - 1].abs() < 0.02);
    }

    #[test]
    fn rescale_fitted_requires_a_fit() {
        let src = SyntheticSource::kitchen(2);
        let mut event = DecayEvent::load(&src, "1", window(21), CalibrationCoefficients::IDENTITY).unwrap();
        let err = event.rescale_fitted(CO2).unwrap_err();
        assert!(matches!(err, DecayError::NotFitted { .. }));

        event.fit(CO2, co2_seed(), &FitOptions::default()).unwrap();
        assert!(matches!(event.state(CO2), Some(SpeciesState::Fitted(_))));
        event.rescale_fitted(CO2).unwrap();
        assert!(matches!(event.state(CO2), Some(SpeciesState::Rescaled { .. })));

        // Refitting overwrites the rescaled curve.
        event.fit(CO2, co2_seed(), &FitOptions::default()).unwrap();
        assert!(event.rescaled(CO2).is_none());
    }

    #[test]
    fn unknown_species_is_reported() {
        let src = SyntheticSource::kitchen(2);
        let mut event = DecayEvent::load(&src, "1", window(22), CalibrationCoefficients::IDENTITY).unwrap();
        let err = event.fit("o3", co2_seed(), &FitOptions::default()).unwrap_err();
        assert!(matches!(err, DecayError::UnknownSpecies { .. }));
    }

    #[test]
    fn degenerate_species_fails_without_touching_others() {
        let src = SyntheticSource::kitchen(4).with_override("20241123T060000Z", TVOC, SpeciesProfile::flat(90.0));
        let mut event = DecayEvent::load(&src, "1", window(23), CalibrationCoefficients::IDENTITY).unwrap();

        event.rescale(CO2, co2_seed(), &FitOptions::default()).unwrap();
        let err = event.rescale(TVOC, DecayParams::new(100.0, -0.5, 70.0), &FitOptions::default()).unwrap_err();
        assert!(matches!(err, DecayError::FitConvergence { .. }));
        assert!(event.rescaled(CO2).is_some());
        assert!(event.state(TVOC).is_none());
    }
}
