// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Vanishing-point estimation: an initial robust fit of the left/right
// text-column edges, refined iteratively using tangents of fitted
// baselines along "longitude" lines through the current estimate.

use nalgebra::Point2;
use tracing::{debug, instrument};

use crate::camera::PrincipalPoint;
use crate::geometry::Line2D;
use crate::model::TextLine;
use crate::ransac::{ransac_fit, LinearXModel, RansacModel};

const RANSAC_ITERS: usize = 30;
const NEWTON_ITERS: u32 = 25;

/// Ordinary least-squares fit of `y = m*x + b`.
fn fit_line_least_squares(points: &[Point2<f64>]) -> Option<Line2D> {
    let n = points.len() as f64;
    if n < 2.0 {
        return None;
    }
    let sx: f64 = points.iter().map(|p| p.x).sum();
    let sy: f64 = points.iter().map(|p| p.y).sum();
    let sxx: f64 = points.iter().map(|p| p.x * p.x).sum();
    let sxy: f64 = points.iter().map(|p| p.x * p.y).sum();
    let denom = n * sxx - sx * sx;
    if denom.abs() < 1e-12 {
        return None;
    }
    let m = (n * sxy - sx * sy) / denom;
    let b = (sy - m * sx) / n;
    Some(Line2D::new(m, b))
}

/// Find the x nearest `seed_x` at which `line.y_at(x) == tl.eval(x)`, via
/// Newton's method on `f(x) = line.y_at(x) - tl.eval(x)`.
fn intersect_line_with_baseline(line: &Line2D, tl: &TextLine, seed_x: f64) -> Option<f64> {
    let mut x = seed_x.clamp(tl.x_left, tl.x_right);
    for _ in 0..NEWTON_ITERS {
        let f = line.y_at(x) - tl.eval(x);
        if f.abs() < 1e-6 {
            return Some(x);
        }
        let fp = line.m - tl.deriv(x);
        if fp.abs() < 1e-12 {
            return None;
        }
        x -= f / fp;
    }
    None
}

fn initial_edge_points(lines: &[TextLine]) -> (Vec<Point2<f64>>, Vec<Point2<f64>>) {
    let left = lines
        .iter()
        .map(|l| Point2::new(l.x_left, l.eval(l.x_left)))
        .collect();
    let right = lines
        .iter()
        .map(|l| Point2::new(l.x_right, l.eval(l.x_right)))
        .collect();
    (left, right)
}

fn fit_edge_linex(points: &[Point2<f64>], threshold: f64, seed: u64) -> LinearXModel {
    ransac_fit(points, LinearXModel::default(), threshold, RANSAC_ITERS, seed)
        .map(|fit| fit.model)
        .unwrap_or_else(|| {
            // Fall back to a plain (non-robust) fit of all points.
            let mut model = LinearXModel::default();
            model.estimate(points);
            model
        })
}

/// Stage 1: the initial vanishing-point estimate from the left/right
/// column edges of the detected lines.
#[instrument(skip(lines))]
pub fn initial_vanishing_point(lines: &[TextLine], ah: f64, seed: u64) -> Point2<f64> {
    let (left_pts, right_pts) = initial_edge_points(lines);
    let threshold = (ah / 10.0).max(1e-6);

    let left_model = fit_edge_linex(&left_pts, threshold, seed);
    let right_model = fit_edge_linex(&right_pts, threshold, seed.wrapping_add(1));

    let left_line = crate::geometry::LineX::new(left_model.m, left_model.b);
    let right_line = crate::geometry::LineX::new(right_model.m, right_model.b);

    match left_line.intersect(&right_line) {
        Some(p) => p,
        None => {
            // Degenerate (parallel column edges): approximate with a point
            // far above the page along the shared column direction.
            let avg_x = left_pts.iter().chain(right_pts.iter()).map(|p| p.x).sum::<f64>()
                / ((left_pts.len() + right_pts.len()).max(1) as f64);
            Point2::new(avg_x, -1.0e6)
        }
    }
}

/// Stage 2: iteratively refine a vanishing-point estimate using tangent
/// convergence points along longitudes through the reference line `C0`.
#[instrument(skip(lines))]
pub fn refine_vanishing_point(
    mut v: Point2<f64>,
    lines: &[TextLine],
    o: PrincipalPoint,
    f: f64,
    n_longs: usize,
    iters: usize,
) -> Point2<f64> {
    if lines.len() < 2 {
        return v;
    }

    for _ in 0..iters {
        let c0_idx = lines
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.width()
                    .partial_cmp(&b.width())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        let ya = a.eval((a.x_left + a.x_right) / 2.0);
                        let yb = b.eval((b.x_left + b.x_right) / 2.0);
                        // Prefer the lower (smaller) y on ties.
                        yb.partial_cmp(&ya).unwrap_or(std::cmp::Ordering::Equal)
                    })
            })
            .map(|(i, _)| i)
            .unwrap();
        let c0 = &lines[c0_idx];

        let mut convergence_points = Vec::with_capacity(n_longs);

        for k in 0..n_longs {
            let t = (k as f64 + 1.0) / (n_longs as f64 + 1.0);
            let x_k = c0.x_left + t * (c0.x_right - c0.x_left);
            let p_k = Point2::new(x_k, c0.eval(x_k));

            let Some(longitude) = Line2D::through(v, p_k) else {
                continue;
            };

            let mut tangents = Vec::new();
            for (j, other) in lines.iter().enumerate() {
                if j == c0_idx {
                    continue;
                }
                let seed_x = x_k.clamp(other.x_left, other.x_right);
                if let Some(x_star) = intersect_line_with_baseline(&longitude, other, seed_x) {
                    let slope = other.deriv(x_star);
                    let y_star = other.eval(x_star);
                    tangents.push(Line2D::new(slope, y_star - slope * x_star));
                }
            }

            if let Some(conv) = Line2D::best_intersection(&tangents) {
                convergence_points.push(conv);
            }
        }

        if convergence_points.len() < 2 {
            debug!("too few convergence points this iteration; keeping previous estimate");
            continue;
        }

        let Some(l_fit) = fit_line_least_squares(&convergence_points) else {
            continue;
        };
        let l_o = l_fit.offset(Point2::new(o.x, o.y));

        if l_o.b.abs() < 1e-9 {
            continue;
        }
        let v_y = -(f * f) / l_o.b;
        let v_x = -l_o.m * v_y;
        v = Point2::new(v_x + o.x, v_y + o.y);
    }

    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Glyph, PolyCurve};

    fn line_from_slope(y_at_0: f64, slope: f64, x0: f64, x1: f64, n: usize) -> TextLine {
        let glyphs: Vec<Glyph> = (0..n)
            .map(|i| {
                let x = x0 + (x1 - x0) * i as f64 / (n - 1) as f64;
                Glyph::new(x, y_at_0 + slope * x - 4.0, 6.0, 8.0)
            })
            .collect();
        TextLine {
            glyphs,
            baseline: PolyCurve::from_am(&[slope * (x1 - x0) / 2.0]),
            x_center: (x0 + x1) / 2.0,
            x_scale: (x1 - x0) / 2.0,
            x_left: x0,
            x_right: x1,
        }
    }

    #[test]
    fn initial_vanishing_point_converges_for_converging_columns() {
        // Two lines whose left edges trend toward a common point above the
        // image as y decreases — a crude stand-in for perspective
        // convergence.
        let lines = vec![
            line_from_slope(100.0, 0.0, 50.0, 450.0, 6),
            line_from_slope(200.0, 0.0, 40.0, 460.0, 6),
            line_from_slope(300.0, 0.0, 30.0, 470.0, 6),
        ];
        let v = initial_vanishing_point(&lines, 12.0, 1);
        assert!(v.x.is_finite() && v.y.is_finite());
    }
}
