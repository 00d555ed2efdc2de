//! Curve rescaling.
//!
//! `(y - c) / a` maps a fitted decay onto a dimensionless curve that starts
//! near 1 and relaxes toward 0, whatever the absolute concentration range or
//! steady state of the episode.

use crate::domain::ExpFit;
use crate::error::DecayError;

/// Relative size below which a fitted amplitude counts as zero.
const AMPLITUDE_REL_EPS: f64 = 1e-12;

/// Rescale `values` with the amplitude and asymptote of `fit`.
pub fn rescale_values(species: &str, values: &[f64], fit: &ExpFit) -> Result<Vec<f64>, DecayError> {
    let a = fit.params.a;
    let c = fit.params.c;

    let y_scale = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let scale = 1.0_f64.max(c.abs()).max(y_scale);
    if !a.is_finite() || a.abs() <= AMPLITUDE_REL_EPS * scale {
        return Err(DecayError::DegenerateRescale {
            species: species.to_string(),
            amplitude: a,
        });
    }

    Ok(values.iter().map(|&y| (y - c) / a).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DecayParams;

    fn fit_with(a: f64, c: f64) -> ExpFit {
        ExpFit {
            params: DecayParams::new(a, -0.5, c),
            covariance: [[0.0; 3]; 3],
            sse: 0.0,
            rmse: 0.0,
            n: 3,
            iterations: 1,
        }
    }

    #[test]
    fn maps_amplitude_and_asymptote() {
        let out = rescale_values("rco2", &[900.0, 650.0, 400.0], &fit_with(500.0, 400.0)).unwrap();
        assert_eq!(out, vec![1.0, 0.5, 0.0]);
    }

    #[test]
    fn negative_amplitude_still_starts_near_one() {
        let out = rescale_values("rco2", &[300.0, 400.0], &fit_with(-100.0, 400.0)).unwrap();
        assert_eq!(out, vec![1.0, -0.0]);
    }

    #[test]
    fn zero_amplitude_is_rejected() {
        let err = rescale_values("tvoc", &[90.0, 90.0], &fit_with(0.0, 90.0)).unwrap_err();
        assert!(matches!(err, DecayError::DegenerateRescale { .. }));

        let err = rescale_values("tvoc", &[90.0, 90.0], &fit_with(1e-14, 90.0)).unwrap_err();
        assert!(matches!(err, DecayError::DegenerateRescale { .. }));
    }
}
