// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Mesh construction: from the recovered rotation and surface polynomial,
// build a dense 2-D coordinate mesh mapping rectified-image pixels back to
// source-image sampling coordinates.

use nalgebra::{Matrix3, Vector3};
use rectify_core::RectifyError;
use tracing::{instrument, warn};

use crate::camera::{gcs_to_image, image_to_focal_plane, PrincipalPoint};
use crate::geometry::resample_by_arc_length;
use crate::model::{Mesh, PolyCurve, TextLine};
use crate::newton;

const X_SAMPLES: usize = 400;
const BOX_EXPAND_FRAC: f64 = 0.01;

struct Box3D {
    x0: f64,
    x1: f64,
    y0: f64,
    y1: f64,
}

impl Box3D {
    fn height(&self) -> f64 {
        (self.y1 - self.y0).max(0.0)
    }
}

/// 70th-percentile line width, used as the mesh's column-count target.
fn percentile_70_width(lines: &[TextLine]) -> f64 {
    let mut widths: Vec<f64> = lines.iter().map(|l| l.width()).collect();
    widths.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let idx = ((widths.len() as f64 - 1.0) * 0.70).round() as usize;
    widths[idx.min(widths.len() - 1)]
}

fn world_corners_box(
    lines: &[TextLine],
    o: PrincipalPoint,
    r: &Matrix3<f64>,
    g: &PolyCurve,
    f: f64,
) -> Box3D {
    let of = Vector3::new(0.0, 0.0, f);
    let mut x0 = f64::INFINITY;
    let mut x1 = f64::NEG_INFINITY;
    let mut y0 = f64::INFINITY;
    let mut y1 = f64::NEG_INFINITY;

    for line in lines {
        for glyph in &line.glyphs {
            for corner in glyph.corners() {
                let ray = image_to_focal_plane(&[corner], o, f)[0];
                if let Ok(hit) = newton::intersect(ray, r, of, g, f) {
                    x0 = x0.min(hit.x);
                    x1 = x1.max(hit.x);
                    y0 = y0.min(hit.y);
                    y1 = y1.max(hit.y);
                }
            }
        }
    }

    if !x0.is_finite() || !x1.is_finite() {
        x0 = -100.0;
        x1 = 100.0;
    }
    if !y0.is_finite() || !y1.is_finite() {
        y0 = -100.0;
        y1 = 100.0;
    }

    let dx = (x1 - x0) * BOX_EXPAND_FRAC;
    let dy = (y1 - y0) * BOX_EXPAND_FRAC;
    Box3D {
        x0: x0 - dx,
        x1: x1 + dx,
        y0: y0 - dy,
        y1: y1 + dy,
    }
}

/// Build the sampling mesh for the recovered `(R, g)`, in the same world
/// frame the joint optimizer solved in.
#[instrument(skip(lines, r, g))]
pub fn build_mesh(
    lines: &[TextLine],
    o: PrincipalPoint,
    r: &Matrix3<f64>,
    g: &PolyCurve,
    f: f64,
    ah: f64,
    aspect_ratio_override: Option<f64>,
) -> Result<Mesh, RectifyError> {
    let box_xyz = world_corners_box(lines, o, r, g, f);

    let n_points_w = (percentile_70_width(lines).round() as usize).max(2);

    let xs: Vec<f64> = (0..X_SAMPLES)
        .map(|i| box_xyz.x0 + (box_xyz.x1 - box_xyz.x0) * i as f64 / (X_SAMPLES - 1) as f64)
        .collect();
    let ys: Vec<f64> = xs.iter().map(|&x| g.eval(x)).collect();
    let (mesh_x, _mesh_gx, total_arc_length) = resample_by_arc_length(&xs, &ys, n_points_w);

    if total_arc_length < 1e-9 {
        return Err(RectifyError::RemapOob("degenerate directrix arc length".to_string()));
    }

    let n_points_h = match aspect_ratio_override {
        Some(ratio) => (n_points_w as f64 * ratio).round() as usize,
        None => (n_points_w as f64 * box_xyz.height() / total_arc_length).round() as usize,
    }
    .max(2);

    let y_samples: Vec<f64> = (0..n_points_h)
        .map(|i| box_xyz.y0 + (box_xyz.y1 - box_xyz.y0) * i as f64 / (n_points_h - 1) as f64)
        .collect();

    let mut out_of_range = 0usize;
    for &x in &mesh_x {
        let within_any = lines.iter().any(|l| x >= l.x_left - ah && x <= l.x_right + ah);
        if !within_any {
            out_of_range += 1;
        }
    }
    if out_of_range > 0 {
        warn!(out_of_range, "mesh columns extrapolate beyond fitted baselines by more than AH");
    }

    let mut mesh = Mesh::new(n_points_w, n_points_h);
    for (row, &y) in y_samples.iter().enumerate() {
        let world_row: Vec<Vector3<f64>> = mesh_x.iter().map(|&x| Vector3::new(x, y, g.eval(x))).collect();
        let image_row = gcs_to_image(&world_row, o, r, f);
        for (col, p) in image_row.into_iter().enumerate() {
            mesh.set(row, col, (p.x as f32, p.y as f32));
        }
    }

    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Glyph;
    use nalgebra::Matrix3;

    fn line(y: f64, x0: f64, x1: f64, n: usize) -> TextLine {
        let glyphs: Vec<Glyph> = (0..n)
            .map(|i| {
                let x = x0 + (x1 - x0) * i as f64 / (n - 1) as f64;
                Glyph::new(x, y - 8.0, 6.0, 8.0)
            })
            .collect();
        TextLine {
            glyphs,
            baseline: PolyCurve::zero(5),
            x_center: (x0 + x1) / 2.0,
            x_scale: (x1 - x0) / 2.0,
            x_left: x0,
            x_right: x1,
        }
    }

    #[test]
    fn build_mesh_produces_expected_dimensions_for_flat_page() {
        let o = PrincipalPoint { x: 400.0, y: 300.0 };
        let f = 2000.0;
        let r: Matrix3<f64> = Matrix3::identity();
        let g = PolyCurve::zero(5);
        let lines = vec![line(100.0, 50.0, 550.0, 10), line(400.0, 50.0, 550.0, 10)];

        let mesh = build_mesh(&lines, o, &r, &g, f, 12.0, None).expect("mesh should build");
        assert!(mesh.width >= 2);
        assert!(mesh.height >= 2);
        assert_eq!(mesh.coords.len(), mesh.width * mesh.height);
    }

    #[test]
    fn aspect_ratio_override_controls_row_count() {
        let o = PrincipalPoint { x: 400.0, y: 300.0 };
        let f = 2000.0;
        let r: Matrix3<f64> = Matrix3::identity();
        let g = PolyCurve::zero(5);
        let lines = vec![line(100.0, 50.0, 550.0, 10), line(400.0, 50.0, 550.0, 10)];

        let mesh = build_mesh(&lines, o, &r, &g, f, 12.0, Some(1.5)).unwrap();
        let expected_h = ((mesh.width as f64) * 1.5).round() as usize;
        assert_eq!(mesh.height, expected_h.max(2));
    }
}
