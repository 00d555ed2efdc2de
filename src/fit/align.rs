//! Multi-curve alignment.
//!
//! Overlaying several decays needs comparably sized samples. The default is
//! sample-count alignment: every event is cut to the shortest event's sample
//! count. This does not compare equal elapsed durations when events are
//! sampled at different densities; `AlignMode::Duration` cuts every event to
//! the shortest elapsed span instead.
//!
//! Alignment is advisory: nothing here mutates events. Consumers (rendering,
//! export) apply the cutoffs.

use crate::domain::AlignMode;
use crate::event::DecayEvent;

/// Last common sample index: `min(len) - 1`. `None` without events.
pub fn min_index(events: &[DecayEvent]) -> Option<usize> {
    min_index_of_lengths(events.iter().map(DecayEvent::len))
}

/// `min_index` over raw sample counts.
pub fn min_index_of_lengths(lengths: impl IntoIterator<Item = usize>) -> Option<usize> {
    lengths.into_iter().min().and_then(|n| n.checked_sub(1))
}

/// Shortest elapsed span (hours) across events.
pub fn common_duration_hours(events: &[DecayEvent]) -> Option<f64> {
    events
        .iter()
        .map(|e| e.series().span_hours())
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

/// Number of leading samples of `event` within `hours` of its first sample.
pub fn cutoff_for_duration(event: &DecayEvent, hours: f64) -> usize {
    event
        .series()
        .elapsed_hours()
        .iter()
        .take_while(|&&h| h <= hours + 1e-9)
        .count()
}

/// Per-event sample counts to keep under the chosen mode.
pub fn cutoffs(events: &[DecayEvent], mode: AlignMode) -> Vec<usize> {
    match mode {
        AlignMode::Samples => {
            let keep = min_index(events).map(|i| i + 1).unwrap_or(0);
            events.iter().map(|_| keep).collect()
        }
        AlignMode::Duration => {
            let hours = common_duration_hours(events).unwrap_or(0.0);
            events.iter().map(|e| cutoff_for_duration(e, hours)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::{Duration, TimeZone, Utc};

    use crate::domain::{CO2, TimeSeries, WindowSpec};

    fn event(n: usize, step_minutes: i64) -> DecayEvent {
        let t0 = Utc.with_ymd_and_hms(2024, 11, 19, 6, 0, 0).unwrap();
        let ts: Vec<_> = (0..n as i64).map(|i| t0 + Duration::minutes(i * step_minutes)).collect();
        let mut values = BTreeMap::new();
        values.insert(CO2.to_string(), (0..n).map(|i| 800.0 - i as f64).collect());
        let series = TimeSeries::new(ts, values).unwrap();
        let window = WindowSpec::new(t0, t0 + Duration::hours(12), false);
        DecayEvent::from_series(window, series)
    }

    #[test]
    fn min_index_is_shortest_length_minus_one() {
        let events = vec![event(10, 5), event(7, 5), event(15, 5)];
        assert_eq!(min_index(&events), Some(6));
        assert_eq!(cutoffs(&events, AlignMode::Samples), vec![7, 7, 7]);
    }

    #[test]
    fn min_index_of_nothing() {
        assert_eq!(min_index(&[]), None);
        assert_eq!(min_index_of_lengths([0usize]), None);
    }

    #[test]
    fn duration_mode_respects_sampling_density() {
        // 10 samples every 10 min (1.5 h) vs 31 samples every 5 min (2.5 h).
        let events = vec![event(10, 10), event(31, 5)];
        let hours = common_duration_hours(&events).unwrap();
        assert!((hours - 1.5).abs() < 1e-12);
        assert_eq!(cutoffs(&events, AlignMode::Duration), vec![10, 19]);
    }
}
