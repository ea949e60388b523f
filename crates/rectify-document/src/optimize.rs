// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Joint nonlinear least-squares optimizer: recovers camera orientation and
// surface polynomial coefficients by minimizing the straightness of text
// baselines once projected onto the recovered page surface. Hand-rolled
// Levenberg-Marquardt with an analytic Jacobian, following the
// normal-equations-plus-damping pattern common to iterative pose solvers
// rather than pulling in a dedicated nonlinear-least-squares crate.

use nalgebra::{DMatrix, DVector, Vector3};
use rectify_core::RectifyError;
use tracing::{debug, instrument, warn};

use crate::camera::{dr_dtheta, r_theta, PrincipalPoint};
use crate::model::{PolyCurve, TextLine};
use crate::newton;

/// Number of reserved-but-unused alignment slots kept in the packed
/// parameter vector so a future objective term can be wired in without
/// reshaping it.
pub const ALIGN_SLOTS: usize = 2;

const MAX_NEWTON_FAIL_RATIO: f64 = 0.10;
const LM_MAX_ITERS: usize = 100;
const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_GROW: f64 = 3.0;
const LAMBDA_SHRINK: f64 = 0.4;
const LAMBDA_MAX: f64 = 1e12;

/// One glyph base-point ray, tagged with the index of the line it belongs
/// to, in the packed parameter vector's `l_m` ordering.
#[derive(Debug, Clone, Copy)]
struct PointRef {
    line: usize,
    ray: Vector3<f64>,
}

pub struct OptimizerContext {
    points: Vec<PointRef>,
    pub num_lines: usize,
    pub degree: usize,
    pub o: PrincipalPoint,
    pub f: f64,
}

impl OptimizerContext {
    pub fn from_lines(lines: &[TextLine], o: PrincipalPoint, f: f64, degree: usize) -> Self {
        let mut points = Vec::new();
        for (m, line) in lines.iter().enumerate() {
            for glyph in &line.glyphs {
                let bp = glyph.base_point();
                let ray = Vector3::new(bp.x - o.x, bp.y - o.y, -f);
                points.push(PointRef { line: m, ray });
            }
        }
        Self {
            points,
            num_lines: lines.len(),
            degree,
            o,
            f,
        }
    }

    pub fn n_params(&self) -> usize {
        3 + self.degree + ALIGN_SLOTS + self.num_lines
    }
}

pub fn pack(theta: Vector3<f64>, am: &[f64], align: [f64; 2], l: &[f64]) -> DVector<f64> {
    let mut v = Vec::with_capacity(3 + am.len() + 2 + l.len());
    v.extend_from_slice(theta.as_slice());
    v.extend_from_slice(am);
    v.extend_from_slice(&align);
    v.extend_from_slice(l);
    DVector::from_vec(v)
}

pub fn unpack(params: &DVector<f64>, degree: usize, num_lines: usize) -> (Vector3<f64>, Vec<f64>, [f64; 2], Vec<f64>) {
    let theta = Vector3::new(params[0], params[1], params[2]);
    let am = params.rows(3, degree).iter().copied().collect::<Vec<_>>();
    let align = [params[3 + degree], params[3 + degree + 1]];
    let l = params
        .rows(3 + degree + ALIGN_SLOTS, num_lines)
        .iter()
        .copied()
        .collect::<Vec<_>>();
    (theta, am, align, l)
}

/// Initial guess: theta from the vanishing point, flat surface, per-line
/// heights averaged from projecting each baseline onto the initial flat
/// surface (Z=0) under the initial rotation.
pub fn initial_guess(lines: &[TextLine], v: nalgebra::Point2<f64>, o: PrincipalPoint, f: f64, degree: usize) -> DVector<f64> {
    let theta0 = Vector3::new((-(v.y - o.y)).atan2(f) - std::f64::consts::FRAC_PI_2, 0.0, 0.0);
    let am0 = vec![0.0; degree];
    let r0 = r_theta(theta0);
    let of = Vector3::new(0.0, 0.0, f);
    let flat = PolyCurve::zero(degree);

    let l0: Vec<f64> = lines
        .iter()
        .map(|line| {
            let ys: Vec<f64> = line
                .glyphs
                .iter()
                .filter_map(|g| {
                    let bp = g.base_point();
                    let ray = Vector3::new(bp.x - o.x, bp.y - o.y, -f);
                    newton::intersect(ray, &r0, of, &flat, f).ok().map(|hit| hit.y)
                })
                .collect();
            if ys.is_empty() {
                0.0
            } else {
                ys.iter().sum::<f64>() / ys.len() as f64
            }
        })
        .collect();

    pack(theta0, &am0, [0.0, 0.0], &l0)
}

/// Evaluate residuals and the analytic Jacobian at `params`. Points whose
/// ray fails to converge in the Newton sub-solve are excluded from the
/// residual set; if more than [`MAX_NEWTON_FAIL_RATIO`] of a line's points
/// fail, the whole line is dropped from this evaluation.
fn residuals_and_jacobian(
    params: &DVector<f64>,
    ctx: &OptimizerContext,
) -> (DVector<f64>, DMatrix<f64>) {
    let (theta, am, _align, l) = unpack(params, ctx.degree, ctx.num_lines);
    let r = r_theta(theta);
    let g = PolyCurve::from_am(&am);
    let d_r = dr_dtheta(theta, &r);
    let of = Vector3::new(0.0, 0.0, ctx.f);

    let row1 = r.row(0).transpose();
    let row2 = r.row(1).transpose();
    let row3 = r.row(2).transpose();

    // Pass 1: per-line failure counts.
    let mut fail_count = vec![0usize; ctx.num_lines];
    let mut total_count = vec![0usize; ctx.num_lines];
    let mut hits = Vec::with_capacity(ctx.points.len());
    for p in &ctx.points {
        total_count[p.line] += 1;
        let hit = newton::intersect(p.ray, &r, of, &g, ctx.f);
        if hit.is_err() {
            fail_count[p.line] += 1;
        }
        hits.push(hit);
    }
    let dropped_lines: Vec<bool> = (0..ctx.num_lines)
        .map(|m| {
            total_count[m] > 0 && (fail_count[m] as f64 / total_count[m] as f64) > MAX_NEWTON_FAIL_RATIO
        })
        .collect();

    let n_cols = ctx.n_params();
    let mut residual_rows = Vec::new();
    let mut jac_rows: Vec<Vec<f64>> = Vec::new();

    for (p, hit) in ctx.points.iter().zip(hits.into_iter()) {
        if dropped_lines[p.line] {
            continue;
        }
        let Ok(hit) = hit else { continue };

        let ray = p.ray;
        let row1_p = row1.dot(&ray);
        let row2_p = row2.dot(&ray);
        let row3_p = row3.dot(&ray);
        let gp = g.deriv(hit.x);
        let denom = row3_p - gp * row1_p;
        if denom.abs() < 1e-12 {
            continue;
        }

        let mut jac_row = vec![0.0; n_cols];

        for i in 0..3 {
            let dr1_i = d_r[i].row(0).transpose();
            let dr2_i = d_r[i].row(1).transpose();
            let dr3_i = d_r[i].row(2).transpose();
            let a_i = dr1_i.dot(&ray) * hit.t - dr1_i.dot(&of);
            let c_i = dr3_i.dot(&ray) * hit.t - dr3_i.dot(&of);
            let dr2p_i = dr2_i.dot(&ray);
            let dr2of_i = dr2_i.dot(&of);

            let dt_dtheta_i = -(c_i - gp * a_i) / denom;
            jac_row[i] = dr2p_i * hit.t + row2_p * dt_dtheta_i - dr2of_i;
        }

        let powers = g.powers(hit.x);
        for k in 1..=ctx.degree {
            jac_row[3 + (k - 1)] = powers[k] * row2_p / denom;
        }
        // Alignment columns (3+degree, 3+degree+1) stay zero: E_align is
        // not implemented, per the pipeline's reserved-slot design.

        let l_col = 3 + ctx.degree + ALIGN_SLOTS + p.line;
        jac_row[l_col] = -1.0;

        residual_rows.push(hit.y - l[p.line]);
        jac_rows.push(jac_row);
    }

    let n_rows = residual_rows.len();
    let residuals = DVector::from_vec(residual_rows);
    let mut jacobian = DMatrix::zeros(n_rows, n_cols);
    for (row_idx, row) in jac_rows.into_iter().enumerate() {
        for (col_idx, v) in row.into_iter().enumerate() {
            jacobian[(row_idx, col_idx)] = v;
        }
    }

    (residuals, jacobian)
}

/// Levenberg-Marquardt with column-norm ("jac") scaling of the damping
/// term and an `ftol`-based relative cost-reduction stopping rule.
#[instrument(skip(initial, ctx))]
pub fn levenberg_marquardt(
    initial: DVector<f64>,
    ctx: &OptimizerContext,
    ftol: f64,
) -> Result<DVector<f64>, RectifyError> {
    let mut params = initial;
    let (mut residuals, mut jacobian) = residuals_and_jacobian(&params, ctx);
    if residuals.len() == 0 {
        return Err(RectifyError::OptimizerDiverges(
            "no valid residuals at initial guess".to_string(),
        ));
    }
    let mut cost = 0.5 * residuals.dot(&residuals);
    let mut lambda = LAMBDA_INIT;

    for iter in 0..LM_MAX_ITERS {
        let jt = jacobian.transpose();
        let jtj = &jt * &jacobian;
        let jtr = &jt * &residuals;

        let scale: Vec<f64> = (0..jtj.nrows())
            .map(|i| jtj[(i, i)].max(1e-12))
            .collect();

        let mut accepted = false;
        for _ in 0..20 {
            let mut damped = jtj.clone();
            for i in 0..damped.nrows() {
                damped[(i, i)] += lambda * scale[i];
            }

            let Some(delta) = damped.lu().solve(&(-&jtr)) else {
                lambda *= LAMBDA_GROW;
                continue;
            };

            let candidate = &params + &delta;
            let (new_residuals, new_jacobian) = residuals_and_jacobian(&candidate, ctx);
            if new_residuals.len() == 0 {
                lambda *= LAMBDA_GROW;
                continue;
            }
            let new_cost = 0.5 * new_residuals.dot(&new_residuals);

            if !new_cost.is_finite() {
                return Err(RectifyError::OptimizerDiverges(
                    "residual cost became non-finite".to_string(),
                ));
            }

            if new_cost < cost {
                let rel_reduction = (cost - new_cost) / cost.max(1e-300);
                params = candidate;
                residuals = new_residuals;
                jacobian = new_jacobian;
                cost = new_cost;
                lambda = (lambda * LAMBDA_SHRINK).max(1e-12);
                accepted = true;

                if rel_reduction < ftol {
                    debug!(iter, cost, "optimizer converged (ftol)");
                    return Ok(params);
                }
                break;
            } else {
                lambda *= LAMBDA_GROW;
                if lambda > LAMBDA_MAX {
                    break;
                }
            }
        }

        if !accepted {
            warn!(iter, lambda, "optimizer stalled; stopping");
            break;
        }
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Glyph;
    use nalgebra::Point2;

    fn flat_line(y: f64, n: usize) -> TextLine {
        let glyphs: Vec<Glyph> = (0..n)
            .map(|i| Glyph::new(i as f64 * 30.0, y - 8.0, 10.0, 8.0))
            .collect();
        TextLine {
            glyphs,
            baseline: PolyCurve::zero(5),
            x_center: (n as f64 * 30.0) / 2.0,
            x_scale: (n as f64 * 30.0) / 2.0,
            x_left: 0.0,
            x_right: n as f64 * 30.0,
        }
    }

    #[test]
    fn pack_unpack_round_trip() {
        let theta = Vector3::new(0.1, 0.2, 0.3);
        let am = vec![1.0, 2.0, 3.0];
        let l = vec![10.0, 20.0];
        let packed = pack(theta, &am, [0.0, 0.0], &l);
        let (t2, am2, align2, l2) = unpack(&packed, 3, 2);
        assert_eq!(theta, t2);
        assert_eq!(am, am2);
        assert_eq!(align2, [0.0, 0.0]);
        assert_eq!(l, l2);
    }

    #[test]
    fn optimizer_recovers_flat_fronto_parallel_page() {
        let o = PrincipalPoint { x: 400.0, y: 300.0 };
        let f = 2000.0;
        let lines = vec![flat_line(200.0, 8), flat_line(350.0, 8)];

        let ctx = OptimizerContext::from_lines(&lines, o, f, 3);
        let v = Point2::new(o.x, -1.0e7); // looking straight down: v far above
        let initial = initial_guess(&lines, v, o, f, 3);

        let solved = levenberg_marquardt(initial, &ctx, 1e-6).unwrap();
        let (_theta, am, _align, _l) = unpack(&solved, 3, 2);
        // A perfectly flat, fronto-parallel page should need negligible
        // surface curvature to explain already-straight lines.
        for a in am {
            assert!(a.abs() < 1e-2, "expected near-zero curvature, got {a}");
        }
    }
}
