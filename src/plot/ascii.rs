//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Two plots:
//! - single series: observed points `o` over the fitted curve `-`
//! - overlay: rescaled curves of several events, `o` for open windows and
//!   `x` for closed ones

use crate::domain::ExpFit;
use crate::io::RenderSeries;
use crate::models::sample_curve;

/// Observed values of one series with its fitted curve.
pub fn render_fit_plot(t: &[f64], y: &[f64], fit: &ExpFit, width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (t_min, t_max) = range(t.iter().copied()).unwrap_or((0.0, 1.0));
    let curve = sample_curve(&fit.params, t_min, t_max, width);

    let (y_min, y_max) = range(y.iter().copied().chain(curve.iter().map(|&(_, v)| v))).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Curve first so points overlay it.
    draw_curve(&mut grid, &curve, t_min, t_max, y_min, y_max);
    for (&ti, &yi) in t.iter().zip(y) {
        let x = map_x(ti, t_min, t_max, width);
        let row = map_y(yi, y_min, y_max, height);
        grid[row][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: t=[{t_min:.3}, {t_max:.3}] hours | y=[{y_min:.2}, {y_max:.2}]\n"
    ));
    push_grid(&mut out, grid);
    out
}

/// Rescaled curves of several events on one grid.
///
/// Series without rescaled values are skipped.
pub fn render_overlay(series: &[RenderSeries], width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let drawable: Vec<&RenderSeries> = series.iter().filter(|s| !s.rescaled.is_empty()).collect();

    let (t_min, t_max) = range(
        drawable
            .iter()
            .flat_map(|s| s.elapsed_hours[..s.rescaled.len().min(s.elapsed_hours.len())].iter().copied()),
    )
    .unwrap_or((0.0, 1.0));
    let (y_min, y_max) = range(drawable.iter().flat_map(|s| s.rescaled.iter().copied())).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];
    for s in &drawable {
        let glyph = if s.window_open { 'o' } else { 'x' };
        for (&t, &v) in s.elapsed_hours.iter().zip(&s.rescaled) {
            if !v.is_finite() {
                continue;
            }
            let x = map_x(t, t_min, t_max, width);
            let row = map_y(v, y_min, y_max, height);
            grid[row][x] = glyph;
        }
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Overlay: t=[{t_min:.3}, {t_max:.3}] hours | rescaled=[{y_min:.2}, {y_max:.2}]\n"
    ));
    push_grid(&mut out, grid);
    out.push_str("legend: o open window, x closed window\n");
    out
}

fn push_grid(out: &mut String, grid: Vec<Vec<char>>) {
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
}

fn range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if min.is_finite() && max.is_finite() && max > min {
        Some((min, max))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], t_min: f64, t_max: f64, y_min: f64, y_max: f64) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(t, y) in curve {
        if !y.is_finite() {
            prev = None;
            continue;
        }
        let x = map_x(t, t_min, t_max, width);
        let yy = map_y(y, y_min, y_max, height);
        if let Some((x0, y0)) = prev {
            draw_line(grid, x0, y0, x, yy, '-');
        } else {
            grid[yy][x] = '-';
        }
        prev = Some((x, yy));
    }
}

/// Integer line drawing (Bresenham).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
