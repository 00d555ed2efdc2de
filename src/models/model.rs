//! Relaxation model evaluation.
//!
//! The fitter relies on two primitive operations:
//! - predict `y(t)` for given parameters (for residuals/plots)
//! - fill a Jacobian row `∂y/∂(a, b, c)` at `t` (for the LM step)

use crate::domain::DecayParams;

/// Evaluate `a * exp(b * t) + c`.
pub fn predict(params: &DecayParams, t: f64) -> f64 {
    params.a * (params.b * t).exp() + params.c
}

/// Fill the Jacobian row at `t`.
///
/// ```text
/// ∂y/∂a = exp(b t)
/// ∂y/∂b = a t exp(b t)
/// ∂y/∂c = 1
/// ```
pub fn fill_jacobian_row(params: &DecayParams, t: f64, out: &mut [f64; 3]) {
    let e = (params.b * t).exp();
    out[0] = e;
    out[1] = params.a * t * e;
    out[2] = 1.0;
}

/// Sample the model on `n` evenly spaced points over `[t_min, t_max]`.
pub fn sample_curve(params: &DecayParams, t_min: f64, t_max: f64, n: usize) -> Vec<(f64, f64)> {
    let n = n.max(2);
    (0..n)
        .map(|i| {
            let u = i as f64 / (n as f64 - 1.0);
            let t = t_min + u * (t_max - t_min);
            (t, predict(params, t))
        })
        .collect()
}
