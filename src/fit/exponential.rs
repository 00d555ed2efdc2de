//! Nonlinear least squares for the relaxation model `a * exp(b * t) + c`.
//!
//! Given:
//! - elapsed times `t_i` (hours)
//! - observed values `y_i`
//! - a caller-supplied starting point `(a0, b0, c0)`
//!
//! we minimize `Σ (y_i - f(t_i))²` with Levenberg–Marquardt:
//!
//! ```text
//! minimize ‖J δ - r‖² + λ ‖D δ‖²,   D = diag(‖J_j‖)
//! ```
//!
//! Each damped step is solved as an augmented linear least squares problem
//! (`[J; √λ D] δ ≈ [r; 0]`) through the shared SVD solver, which keeps the
//! step well defined even when `a ≈ 0` makes the `b` column vanish.
//!
//! Convergence is not guaranteed. Degenerate input and exhausted iteration
//! budgets are reported as [`FitFailure`]; nothing is silently returned.

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};

use crate::domain::{DecayParams, ExpFit};
use crate::error::DecayError;
use crate::math::{pseudo_inverse, solve_least_squares};
use crate::models::{fill_jacobian_row, predict};

/// Minimum number of distinct time points (three free parameters).
pub const MIN_DISTINCT_POINTS: usize = 3;

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-15;
const LAMBDA_MAX: f64 = 1e16;

/// Optimizer budget and tolerances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Maximum number of outer (Jacobian) iterations.
    pub max_iterations: usize,
    /// Relative SSE reduction below which an accepted step counts as converged.
    pub ftol: f64,
    /// Relative step size below which the parameters count as converged.
    pub xtol: f64,
    /// Scaled gradient norm below which the current point is stationary.
    pub gtol: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-12,
        }
    }
}

/// Why a fit could not be produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FitFailure {
    pub reason: String,
}

impl FitFailure {
    fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    /// Attach the species the fit was attempted for.
    pub fn for_species(self, species: &str) -> DecayError {
        DecayError::fit(species, self.reason)
    }
}

impl std::fmt::Display for FitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for FitFailure {}

/// Fit `a * exp(b * t) + c` to `(t, y)` starting from `seed`.
///
/// A non-negative fitted `b` means the window does not look like a decay; the
/// fit is still returned, with a warning logged and `ExpFit::is_decay() == false`.
pub fn fit_exponential(
    t: &[f64],
    y: &[f64],
    seed: DecayParams,
    opts: &FitOptions,
) -> Result<ExpFit, FitFailure> {
    validate_inputs(t, y)?;
    if !seed.is_finite() {
        return Err(FitFailure::new(format!("Initial guess is not finite: {seed:?}.")));
    }

    let n = t.len();
    let mut p = seed;
    let (mut r, mut sse) = residuals(t, y, &p);
    if !sse.is_finite() {
        return Err(FitFailure::new("Initial guess produces non-finite residuals."));
    }

    let mut lambda = LAMBDA_INIT;
    let mut converged = false;
    let mut iterations = 0usize;

    'outer: for iter in 1..=opts.max_iterations {
        iterations = iter;
        let j = jacobian(t, &p);

        if sse == 0.0 || scaled_gradient_norm(&j, &r, sse) <= opts.gtol {
            converged = true;
            break;
        }

        let col_scale: Vec<f64> = (0..3).map(|k| j.column(k).norm().max(1e-300)).collect();
        let p_norm = DVector::from_row_slice(&p.as_array()).norm();

        loop {
            let Some(step) = damped_step(&j, &r, &col_scale, lambda) else {
                lambda *= 10.0;
                if lambda > LAMBDA_MAX {
                    return Err(FitFailure::new("Damped step could not be solved."));
                }
                continue;
            };

            let step_norm = step.norm();
            let small_step = step_norm <= opts.xtol * (p_norm + opts.xtol);
            let trial = DecayParams::new(p.a + step[0], p.b + step[1], p.c + step[2]);
            let (r_trial, sse_trial) = residuals(t, y, &trial);

            if trial.is_finite() && sse_trial.is_finite() && sse_trial < sse {
                let rel = (sse - sse_trial) / sse;
                p = trial;
                r = r_trial;
                sse = sse_trial;
                lambda = (lambda / 10.0).max(LAMBDA_MIN);
                debug!(
                    "lm iter={iter} sse={sse:.6e} lambda={lambda:.1e} a={:.4} b={:.6} c={:.4}",
                    p.a, p.b, p.c
                );
                if rel <= opts.ftol || small_step || sse == 0.0 {
                    converged = true;
                    break 'outer;
                }
                break;
            }

            // No improvement possible even with a vanishing step: stationary point.
            if small_step {
                converged = true;
                break 'outer;
            }

            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                return Err(FitFailure::new(format!(
                    "Damping diverged after {iter} iterations without reaching a stationary point (sse={sse:.6e})."
                )));
            }
        }
    }

    if !converged {
        return Err(FitFailure::new(format!(
            "Did not converge within {} iterations (sse={sse:.6e}).",
            opts.max_iterations
        )));
    }

    let covariance = covariance(t, &p, sse, n);
    let fit = ExpFit {
        params: p,
        covariance,
        sse,
        rmse: (sse / n as f64).sqrt(),
        n,
        iterations,
    };

    if !fit.is_decay() {
        warn!(
            "Fitted rate b={:.6} is non-negative; the window does not relax toward an asymptote.",
            fit.params.b
        );
    }

    Ok(fit)
}

/// Data-driven starting point for callers without a domain-specific seed.
///
/// - `c0`: mean of the last tenth of the samples (the apparent plateau)
/// - `a0`: first sample minus `c0`
/// - `b0`: slope of `ln|y - c|` against `t`, falling back to `τ = span / 3`
pub fn estimate_seed(t: &[f64], y: &[f64]) -> Result<DecayParams, FitFailure> {
    validate_inputs(t, y)?;

    let mut pairs: Vec<(f64, f64)> = t.iter().copied().zip(y.iter().copied()).collect();
    pairs.sort_by(|l, r| l.0.partial_cmp(&r.0).unwrap_or(std::cmp::Ordering::Equal));

    let n = pairs.len();
    let tail = (n / 10).max(1);
    let c0 = pairs[n - tail..].iter().map(|&(_, v)| v).sum::<f64>() / tail as f64;
    let (y_min, y_max) = pairs
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, v)| (lo.min(v), hi.max(v)));
    let range = y_max - y_min;

    let mut a0 = pairs[0].1 - c0;
    if a0 == 0.0 {
        a0 = range;
    }

    // Shift the plateau slightly past the data so the logarithm stays finite.
    let c_shift = c0 - a0.signum() * 0.05 * range;
    let usable: Vec<(f64, f64)> = pairs
        .iter()
        .filter_map(|&(ti, yi)| {
            let d = (yi - c_shift) * a0.signum();
            if d > 0.0 { Some((ti, d.ln())) } else { None }
        })
        .collect();

    let span = pairs[n - 1].0 - pairs[0].0;
    let fallback_b = -3.0 / span;

    let b0 = if usable.len() >= 2 {
        let x = DMatrix::from_fn(usable.len(), 2, |i, k| if k == 0 { 1.0 } else { usable[i].0 });
        let z = DVector::from_iterator(usable.len(), usable.iter().map(|&(_, v)| v));
        match solve_least_squares(&x, &z) {
            Some(beta) if beta[1].is_finite() && beta[1] < 0.0 => beta[1],
            _ => fallback_b,
        }
    } else {
        fallback_b
    };

    Ok(DecayParams::new(a0, b0, c0))
}

fn validate_inputs(t: &[f64], y: &[f64]) -> Result<(), FitFailure> {
    if t.len() != y.len() {
        return Err(FitFailure::new(format!(
            "Length mismatch: {} time points vs {} values.",
            t.len(),
            y.len()
        )));
    }
    if t.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(FitFailure::new("Input contains non-finite values."));
    }

    let mut distinct: Vec<f64> = t.to_vec();
    distinct.sort_by(|l, r| l.partial_cmp(r).unwrap_or(std::cmp::Ordering::Equal));
    distinct.dedup();
    if distinct.len() < MIN_DISTINCT_POINTS {
        return Err(FitFailure::new(format!(
            "Need at least {MIN_DISTINCT_POINTS} distinct time points, got {}.",
            distinct.len()
        )));
    }

    let (lo, hi) = y
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let scale = lo.abs().max(hi.abs()).max(1.0);
    if hi - lo <= f64::EPSILON * scale {
        return Err(FitFailure::new("Values have zero variance."));
    }

    Ok(())
}

fn residuals(t: &[f64], y: &[f64], p: &DecayParams) -> (DVector<f64>, f64) {
    let r = DVector::from_iterator(t.len(), t.iter().zip(y).map(|(&ti, &yi)| yi - predict(p, ti)));
    let sse = r.norm_squared();
    (r, sse)
}

fn jacobian(t: &[f64], p: &DecayParams) -> DMatrix<f64> {
    let mut j = DMatrix::<f64>::zeros(t.len(), 3);
    let mut row = [0.0; 3];
    for (i, &ti) in t.iter().enumerate() {
        fill_jacobian_row(p, ti, &mut row);
        for k in 0..3 {
            j[(i, k)] = row[k];
        }
    }
    j
}

fn damped_step(j: &DMatrix<f64>, r: &DVector<f64>, col_scale: &[f64], lambda: f64) -> Option<DVector<f64>> {
    let n = j.nrows();
    let mut x = DMatrix::<f64>::zeros(n + 3, 3);
    x.view_mut((0, 0), (n, 3)).copy_from(j);
    let sl = lambda.sqrt();
    for k in 0..3 {
        x[(n + k, k)] = sl * col_scale[k];
    }

    let mut rhs = DVector::<f64>::zeros(n + 3);
    rhs.rows_mut(0, n).copy_from(r);

    solve_least_squares(&x, &rhs)
}

/// Max over parameters of `|J_kᵀ r| / (‖J_k‖ ‖r‖)`.
fn scaled_gradient_norm(j: &DMatrix<f64>, r: &DVector<f64>, sse: f64) -> f64 {
    let rnorm = sse.sqrt();
    let g = j.transpose() * r;
    (0..3)
        .filter_map(|k| {
            let cn = j.column(k).norm();
            if cn > 0.0 { Some(g[k].abs() / (cn * rnorm)) } else { None }
        })
        .fold(0.0, f64::max)
}

fn covariance(t: &[f64], p: &DecayParams, sse: f64, n: usize) -> [[f64; 3]; 3] {
    let mut out = [[f64::INFINITY; 3]; 3];
    if n <= 3 {
        return out;
    }
    let j = jacobian(t, p);
    let jtj = j.transpose() * &j;
    let Some(inv) = pseudo_inverse(&jtj, f64::EPSILON * n as f64) else {
        return out;
    };
    let s2 = sse / (n - 3) as f64;
    for (row, out_row) in out.iter_mut().enumerate() {
        for (col, cell) in out_row.iter_mut().enumerate() {
            *cell = inv[(row, col)] * s2;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    fn grid(n: usize, step: f64) -> Vec<f64> {
        (0..n).map(|i| i as f64 * step).collect()
    }

    fn within(actual: f64, expected: f64, rel: f64) -> bool {
        (actual - expected).abs() <= rel * expected.abs()
    }

    #[test]
    fn recovers_exact_parameters() {
        let truth = DecayParams::new(480.0, -0.9, 415.0);
        let t = grid(40, 0.125);
        let y: Vec<f64> = t.iter().map(|&ti| predict(&truth, ti)).collect();

        let fit = fit_exponential(&t, &y, DecayParams::new(500.0, -0.5, 400.0), &FitOptions::default())
            .unwrap();
        assert!(within(fit.params.a, truth.a, 1e-6), "a={}", fit.params.a);
        assert!(within(fit.params.b, truth.b, 1e-6), "b={}", fit.params.b);
        assert!(within(fit.params.c, truth.c, 1e-6), "c={}", fit.params.c);
        assert!(fit.is_decay());
        assert!((fit.time_constant().unwrap() - 1.0 / 0.9).abs() < 1e-5);
    }

    #[test]
    fn recovers_parameters_under_one_percent_noise() {
        let truth = DecayParams::new(500.0, -0.8, 420.0);
        let t = grid(61, 0.1);
        let mut rng = StdRng::seed_from_u64(7);
        let noise = Normal::new(0.0, 0.01 * truth.a).unwrap();
        let y: Vec<f64> = t
            .iter()
            .map(|&ti| predict(&truth, ti) + noise.sample(&mut rng))
            .collect();

        let fit = fit_exponential(&t, &y, DecayParams::new(400.0, -0.5, 400.0), &FitOptions::default())
            .unwrap();
        assert!(within(fit.params.a, truth.a, 0.05), "a={}", fit.params.a);
        assert!(within(fit.params.b, truth.b, 0.05), "b={}", fit.params.b);
        assert!(within(fit.params.c, truth.c, 0.05), "c={}", fit.params.c);

        let se = fit.std_errors();
        assert!(se.iter().all(|v| v.is_finite() && *v > 0.0), "se={se:?}");
    }

    #[test]
    fn growth_is_fitted_but_not_a_decay() {
        let truth = DecayParams::new(5.0, 0.3, 10.0);
        let t = grid(30, 0.2);
        let y: Vec<f64> = t.iter().map(|&ti| predict(&truth, ti)).collect();

        let fit = fit_exponential(&t, &y, DecayParams::new(4.0, 0.2, 8.0), &FitOptions::default()).unwrap();
        assert!(!fit.is_decay());
        assert!(fit.time_constant().is_none());
        assert!(within(fit.params.b, 0.3, 1e-4));
    }

    #[test]
    fn rejects_zero_variance() {
        let t = grid(10, 0.1);
        let y = vec![412.0; 10];
        let err = fit_exponential(&t, &y, DecayParams::new(1.0, -1.0, 0.0), &FitOptions::default())
            .unwrap_err();
        assert!(err.reason.contains("variance"));
    }

    #[test]
    fn rejects_too_few_distinct_times() {
        let t = vec![0.0, 0.0, 1.0, 1.0];
        let y = vec![5.0, 5.1, 3.0, 3.2];
        let err = fit_exponential(&t, &y, DecayParams::new(1.0, -1.0, 0.0), &FitOptions::default())
            .unwrap_err();
        assert!(err.reason.contains("distinct"));
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = fit_exponential(&[0.0, 1.0, 2.0], &[1.0, 2.0], DecayParams::new(1.0, -1.0, 0.0), &FitOptions::default())
            .unwrap_err();
        assert!(err.reason.contains("mismatch"));
    }

    #[test]
    fn reports_exhausted_iteration_budget() {
        let truth = DecayParams::new(500.0, -0.8, 420.0);
        let t = grid(50, 0.1);
        let y: Vec<f64> = t.iter().map(|&ti| predict(&truth, ti)).collect();
        let opts = FitOptions {
            max_iterations: 1,
            ..FitOptions::default()
        };

        let err = fit_exponential(&t, &y, DecayParams::new(1.0, -1e-5, 600.0), &opts).unwrap_err();
        let decay_err = err.for_species("rco2");
        assert!(matches!(decay_err, DecayError::FitConvergence { ref species, .. } if species == "rco2"));
    }

    #[test]
    fn covariance_is_infinite_without_residual_dof() {
        let p = DecayParams::new(10.0, -1.0, 2.0);
        let cov = covariance(&[0.0, 1.0, 2.0], &p, 0.0, 3);
        assert!(cov[0][0].is_infinite());
    }

    #[test]
    fn estimated_seed_leads_to_convergence() {
        let truth = DecayParams::new(-150.0, -1.2, 800.0);
        let t = grid(48, 0.1);
        let y: Vec<f64> = t.iter().map(|&ti| predict(&truth, ti)).collect();

        let seed = estimate_seed(&t, &y).unwrap();
        assert!(seed.b < 0.0);
        assert!(seed.a < 0.0);

        let fit = fit_exponential(&t, &y, seed, &FitOptions::default()).unwrap();
        assert!(within(fit.params.b, truth.b, 1e-4), "b={}", fit.params.b);
        assert!(within(fit.params.c, truth.c, 1e-4), "c={}", fit.params.c);
    }
}
