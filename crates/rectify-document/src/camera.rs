// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pinhole camera model: image <-> focal-plane <-> world-frame (GCS)
// transforms, and the Rodrigues rotation used to go from the 3 optimizer
// rotation parameters to a rotation matrix.

use nalgebra::{Matrix3, Point2, Rotation3, Vector3};

/// Principal point of the image, in pixel coordinates.
#[derive(Debug, Clone, Copy)]
pub struct PrincipalPoint {
    pub x: f64,
    pub y: f64,
}

impl PrincipalPoint {
    pub fn for_image(width: u32, height: u32) -> Self {
        Self {
            x: width as f64 / 2.0,
            y: height as f64 / 2.0,
        }
    }
}

/// Rodrigues rotation matrix for axis-angle vector `theta`.
///
/// `nalgebra::Rotation3::new` implements exactly this construction (angle
/// `||theta||`, axis `theta / ||theta||`) and already handles the
/// near-zero-angle case robustly via its internal small-angle series, so it
/// is used directly rather than re-deriving the formula by hand.
pub fn r_theta(theta: Vector3<f64>) -> Matrix3<f64> {
    *Rotation3::new(theta).matrix()
}

fn skew(v: Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

/// The three partial derivatives `dR/dtheta_i` of the Rodrigues rotation
/// with respect to each component of the axis-angle vector `theta`,
/// evaluated at the already-computed `r = r_theta(theta)`.
///
/// Uses the closed-form exponential-coordinates derivative (Gallego &
/// Yezzi 2014): for `theta != 0`,
///   dR/dtheta_i = (theta_i * [theta]_x + [theta x ((I-R) e_i)]_x) / ||theta||^2 * R
/// and at `theta == 0` the limit is the generator `[e_i]_x`.
pub fn dr_dtheta(theta: Vector3<f64>, r: &Matrix3<f64>) -> [Matrix3<f64>; 3] {
    let norm2 = theta.dot(&theta);
    if norm2 < 1e-14 {
        return [
            skew(Vector3::new(1.0, 0.0, 0.0)),
            skew(Vector3::new(0.0, 1.0, 0.0)),
            skew(Vector3::new(0.0, 0.0, 1.0)),
        ];
    }

    let i_minus_r = Matrix3::identity() - r;
    let theta_skew = skew(theta);
    std::array::from_fn(|i| {
        let e_i = Vector3::ith(i, 1.0);
        let col = i_minus_r * e_i;
        let cross_term = theta.cross(&col);
        let term = theta[i] * theta_skew + skew(cross_term);
        (term / norm2) * r
    })
}

/// Map image-plane points to their corresponding focal-plane 3-D points:
/// `(u - O_x, v - O_y, -f)`.
pub fn image_to_focal_plane(points: &[Point2<f64>], o: PrincipalPoint, f: f64) -> Vec<Vector3<f64>> {
    points
        .iter()
        .map(|p| Vector3::new(p.x - o.x, p.y - o.y, -f))
        .collect()
}

/// Project 3-D focal-plane-relative points back to image coordinates:
/// divide by `z / -f`, drop z, add the principal point back.
pub fn project_to_image(points: &[Vector3<f64>], o: PrincipalPoint, f: f64) -> Vec<Point2<f64>> {
    points
        .iter()
        .map(|p| {
            let scale = p.z / -f;
            Point2::new(p.x / scale + o.x, p.y / scale + o.y)
        })
        .collect()
}

/// Map world-frame (GCS) 3-D points back to image-plane sampling
/// coordinates: undo the camera rotation, translate by the focal offset
/// `(0, 0, f)`, then project.
pub fn gcs_to_image(points: &[Vector3<f64>], o: PrincipalPoint, r: &Matrix3<f64>, f: f64) -> Vec<Point2<f64>> {
    let r_inv = r.transpose(); // R is orthonormal: R^-1 == R^T
    let of = Vector3::new(0.0, 0.0, f);
    let rotated: Vec<Vector3<f64>> = points.iter().map(|p| r_inv * p + of).collect();
    project_to_image(&rotated, o, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn r_theta_zero_is_identity() {
        let r = r_theta(Vector3::new(0.0, 0.0, 0.0));
        assert_relative_eq!(r, Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn r_theta_is_orthonormal_with_unit_determinant() {
        let r = r_theta(Vector3::new(0.3, -0.6, 0.9));
        let should_be_identity = r * r.transpose();
        assert_relative_eq!(should_be_identity, Matrix3::identity(), epsilon = 1e-9);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn r_theta_and_negative_theta_are_inverses() {
        let theta = Vector3::new(0.2, 0.1, -0.4);
        let r = r_theta(theta);
        let r_neg = r_theta(-theta);
        assert_relative_eq!(r * r_neg, Matrix3::identity(), epsilon = 1e-9);
    }

    #[test]
    fn project_and_unproject_round_trip_direction() {
        let o = PrincipalPoint { x: 400.0, y: 300.0 };
        let f = 1200.0;
        let p = Vector3::new(120.0, -45.0, -900.0);
        let img = project_to_image(&[p], o, f);
        let back = image_to_focal_plane(&img, o, f);
        // Both vectors should point in the same direction from the
        // pinhole origin (same ray), i.e. be positive scalar multiples.
        let ratio_x = back[0].x / p.x;
        let ratio_z = back[0].z / p.z;
        assert!(ratio_x > 0.0 && ratio_z > 0.0);
        assert_relative_eq!(ratio_x, ratio_z, epsilon = 1e-9);
    }

    #[test]
    fn dr_dtheta_matches_central_finite_difference() {
        let theta = Vector3::new(0.25, -0.4, 0.1);
        let r = r_theta(theta);
        let analytic = dr_dtheta(theta, &r);

        let h = 1e-6;
        for i in 0..3 {
            let mut plus = theta;
            plus[i] += h;
            let mut minus = theta;
            minus[i] -= h;
            let numeric = (r_theta(plus) - r_theta(minus)) / (2.0 * h);
            assert_relative_eq!(analytic[i], numeric, epsilon = 1e-4);
        }
    }

    #[test]
    fn dr_dtheta_at_zero_matches_generators() {
        let theta = Vector3::zeros();
        let r = r_theta(theta);
        let analytic = dr_dtheta(theta, &r);
        let h = 1e-6;
        for i in 0..3 {
            let mut plus = Vector3::zeros();
            plus[i] = h;
            let numeric = (r_theta(plus) - Matrix3::identity()) / h;
            assert_relative_eq!(analytic[i], numeric, epsilon = 1e-3);
        }
    }
}
