//! Synthetic decay records.
//!
//! Produces records shaped like the AirGradient payload from known relaxation
//! parameters plus Gaussian noise. Output is fully determined by the source
//! seed and the requested window, so offline runs and tests are reproducible.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Duration, Utc};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::data::MeasurementSource;
use crate::domain::{CO2, DecayParams, PM10, SampleRecord, TVOC, elapsed_hours_between};
use crate::error::DecayError;
use crate::io::parse_window_bound;

/// Generating parameters for one species.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeciesProfile {
    pub params: DecayParams,
    /// Standard deviation of additive Gaussian noise.
    pub noise_sd: f64,
}

impl SpeciesProfile {
    pub const fn new(params: DecayParams, noise_sd: f64) -> Self {
        Self { params, noise_sd }
    }

    /// A flat, noise-free series (degenerate for fitting).
    pub const fn flat(level: f64) -> Self {
        Self::new(DecayParams::new(0.0, -1.0, level), 0.0)
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticSource {
    seed: u64,
    interval: Duration,
    /// Relative per-window jitter applied to amplitude and rate.
    jitter: f64,
    profiles: BTreeMap<String, SpeciesProfile>,
    overrides: BTreeMap<(String, String), SpeciesProfile>,
    outages: Vec<String>,
}

impl SyntheticSource {
    pub fn new(seed: u64, interval: Duration) -> Self {
        Self {
            seed,
            interval,
            jitter: 0.0,
            profiles: BTreeMap::new(),
            overrides: BTreeMap::new(),
            outages: Vec::new(),
        }
    }

    /// CO2/TVOC/PM10 decays typical of a poorly ventilated kitchen, sampled
    /// every five minutes.
    pub fn kitchen(seed: u64) -> Self {
        Self::new(seed, Duration::minutes(5))
            .with_jitter(0.3)
            .with_species(CO2, SpeciesProfile::new(DecayParams::new(600.0, -0.7, 450.0), 6.0))
            .with_species(TVOC, SpeciesProfile::new(DecayParams::new(120.0, -0.5, 80.0), 2.0))
            .with_species(PM10, SpeciesProfile::new(DecayParams::new(8.0, -0.9, 3.0), 0.3))
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 0.9);
        self
    }

    pub fn with_species(mut self, species: &str, profile: SpeciesProfile) -> Self {
        self.profiles.insert(species.to_string(), profile);
        self
    }

    /// Replace one species' profile for the window starting at `from` (wire token).
    pub fn with_override(mut self, from: &str, species: &str, profile: SpeciesProfile) -> Self {
        self.overrides
            .insert((from.to_string(), species.to_string()), profile);
        self
    }

    /// Return no records for the window starting at `from` (wire token).
    pub fn with_outage(mut self, from: &str) -> Self {
        self.outages.push(from.to_string());
        self
    }

    fn window_rng(&self, location_id: &str, from: &str, to: &str) -> StdRng {
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        location_id.hash(&mut hasher);
        from.hash(&mut hasher);
        to.hash(&mut hasher);
        StdRng::seed_from_u64(hasher.finish())
    }

    fn window_profiles(&self, from: &str, rng: &mut StdRng) -> BTreeMap<String, SpeciesProfile> {
        self.profiles
            .iter()
            .map(|(species, base)| {
                let key = (from.to_string(), species.clone());
                let profile = match self.overrides.get(&key) {
                    Some(over) => *over,
                    None => {
                        let ja = 1.0 + self.jitter * rng.gen_range(-1.0..=1.0);
                        let jb = 1.0 + self.jitter * rng.gen_range(-1.0..=1.0);
                        let p = base.params;
                        SpeciesProfile::new(DecayParams::new(p.a * ja, p.b * jb, p.c), base.noise_sd)
                    }
                };
                (species.clone(), profile)
            })
            .collect()
    }

    fn record_at(
        timestamp: DateTime<Utc>,
        hours: f64,
        profiles: &BTreeMap<String, SpeciesProfile>,
        rng: &mut StdRng,
    ) -> Result<SampleRecord, DecayError> {
        let mut record = SampleRecord::new(timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string());
        for (species, profile) in profiles {
            let noise = if profile.noise_sd > 0.0 {
                let normal = Normal::new(0.0, profile.noise_sd).map_err(|e| DecayError::UpstreamFetch {
                    message: format!("noise distribution error: {e}"),
                })?;
                normal.sample(rng)
            } else {
                0.0
            };
            let p = profile.params;
            record
                .values
                .insert(species.clone(), p.a * (p.b * hours).exp() + p.c + noise);
        }
        Ok(record)
    }
}

impl MeasurementSource for SyntheticSource {
    fn fetch(&self, location_id: &str, from: &str, to: &str) -> Result<Vec<SampleRecord>, DecayError> {
        if self.outages.iter().any(|o| o == from) {
            return Ok(Vec::new());
        }
        if self.interval <= Duration::zero() {
            return Err(DecayError::UpstreamFetch {
                message: "synthetic sampling interval must be positive".to_string(),
            });
        }

        let start = parse_window_bound(from)?;
        let stop = parse_window_bound(to)?;
        let mut rng = self.window_rng(location_id, from, to);
        let profiles = self.window_profiles(from, &mut rng);

        let mut records = Vec::new();
        let mut ts = start;
        while ts <= stop {
            let hours = elapsed_hours_between(start, ts);
            records.push(Self::record_at(ts, hours, &profiles, &mut rng)?);
            ts += self.interval;
        }
        Ok(records)
    }

    fn fetch_current(&self, location_id: &str) -> Result<SampleRecord, DecayError> {
        let now = Utc::now();
        let token = now.format("%Y%m%dT%H%M%SZ").to_string();
        let mut rng = self.window_rng(location_id, &token, &token);
        // Steady state: the asymptote plus noise.
        let steady: BTreeMap<String, SpeciesProfile> = self
            .profiles
            .iter()
            .map(|(s, p)| (s.clone(), SpeciesProfile::new(DecayParams::new(0.0, p.params.b, p.params.c), p.noise_sd)))
            .collect();
        Self::record_at(now, 0.0, &steady, &mut rng)
    }
}
