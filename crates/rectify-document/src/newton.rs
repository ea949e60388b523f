// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ray-surface intersection: for an image ray and the current (R, g)
// estimate, find where the ray meets the recovered page surface.

use nalgebra::{Matrix3, Vector3};
use rectify_core::RectifyError;

use crate::model::PolyCurve;

/// Maximum Newton iterations before a ray is declared non-convergent.
pub const MAX_ITERS: u32 = 30;

/// World-frame coordinates of a ray/surface hit, plus the ray parameter.
#[derive(Debug, Clone, Copy)]
pub struct Hit {
    pub t: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Solve for `t` such that `q(t) = R * (t*p - of)` satisfies
/// `q_z(t) = g(q_x(t))`, via Newton's method with the analytic derivative
/// `dF/dt = R_row3.p - g'(X) * R_row1.p`.
pub fn intersect(
    p: Vector3<f64>,
    r: &Matrix3<f64>,
    of: Vector3<f64>,
    g: &PolyCurve,
    f_scale: f64,
) -> Result<Hit, RectifyError> {
    let row1 = r.row(0).transpose();
    let row3 = r.row(2).transpose();

    let row1_p = row1.dot(&p);
    let row3_p = row3.dot(&p);
    let row1_of = row1.dot(&of);
    let row3_of = row3.dot(&of);

    if row3_p.abs() < 1e-15 {
        return Err(RectifyError::NewtonNonConvergent { iterations: 0 });
    }

    let mut t = row3_of / row3_p;
    let tol = 1e-8 * f_scale.max(1.0);

    for iter in 0..MAX_ITERS {
        let x = t * row1_p - row1_of;
        let z = t * row3_p - row3_of;
        let residual = z - g.eval(x);

        if residual.abs() < tol {
            let q = r * (t * p - of);
            return Ok(Hit {
                t,
                x: q.x,
                y: q.y,
                z: q.z,
            });
        }

        let deriv = row3_p - g.deriv(x) * row1_p;
        if deriv.abs() < 1e-15 {
            return Err(RectifyError::NewtonNonConvergent { iterations: iter });
        }
        t -= residual / deriv;
    }

    Err(RectifyError::NewtonNonConvergent {
        iterations: MAX_ITERS,
    })
}

/// Batch form: intersect every ray point against the same `(R, g)`.
/// Failures are reported per-point rather than aborting the whole batch.
pub fn intersect_batch(
    points: &[Vector3<f64>],
    r: &Matrix3<f64>,
    of: Vector3<f64>,
    g: &PolyCurve,
    f_scale: f64,
) -> Vec<Result<Hit, RectifyError>> {
    points
        .iter()
        .map(|&p| intersect(p, r, of, g, f_scale))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn recovers_known_point_on_flat_surface() {
        let r: Matrix3<f64> = Matrix3::identity();
        let of = Vector3::new(0.0, 0.0, 1000.0);
        let g = PolyCurve::zero(7); // g(X) = 0 everywhere

        // Pick a world point on the surface (Z=0), then compute which ray
        // point maps to it under t=1: q(1) = R*(p - of) = p - of.
        let world = Vector3::new(40.0, -15.0, 0.0);
        let p = world + of;

        let hit = intersect(p, &r, of, &g, 1000.0).expect("should converge");
        assert!(hit.z.abs() < 1e-6);
        assert!((hit.x - world.x).abs() < 1e-6);
        assert!((hit.y - world.y).abs() < 1e-6);
    }

    #[test]
    fn recovers_known_point_on_curved_surface() {
        let r: Matrix3<f64> = Matrix3::identity();
        let of = Vector3::new(0.0, 0.0, 3000.0);
        let g = PolyCurve::from_am(&[0.0, 0.0002]); // g(X) = 0.0002 X^2

        let x_target = 60.0;
        let world = Vector3::new(x_target, 10.0, g.eval(x_target));
        let p = world + of;

        let hit = intersect(p, &r, of, &g, 3000.0).expect("should converge");
        assert!((hit.x - world.x).abs() < 1e-5);
        assert!((hit.z - world.z).abs() < 1e-5);
    }

    #[test]
    fn degenerate_ray_parallel_to_surface_fails_gracefully() {
        let r: Matrix3<f64> = Matrix3::identity();
        let of = Vector3::new(0.0, 0.0, 1000.0);
        let g = PolyCurve::zero(7);
        let p = Vector3::new(1.0, 0.0, 0.0); // row3.p == 0

        assert!(intersect(p, &r, of, &g, 1000.0).is_err());
    }
}
