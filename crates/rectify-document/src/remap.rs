// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image remapper: resamples the source image through a dense 2-D
// coordinate mesh via bilinear interpolation, mirroring `cv2.remap` and
// the warp/fill pattern used by `correct_perspective`'s `warp_into` call.

use image::{GrayImage, Luma};
use rectify_core::RectifyError;
use tracing::instrument;

use crate::model::Mesh;

/// Resamples a source image through a coordinate mesh.
pub trait Remapper {
    fn remap(&self, image: &GrayImage, mesh: &Mesh) -> Result<GrayImage, RectifyError>;
}

/// Bilinear resampler; source pixels outside the image bounds fill with
/// `fill_value` (0 by default, matching the reference's zero-fill).
pub struct BilinearRemapper {
    pub fill_value: u8,
}

impl Default for BilinearRemapper {
    fn default() -> Self {
        Self { fill_value: 0 }
    }
}

impl BilinearRemapper {
    pub fn new(fill_value: u8) -> Self {
        Self { fill_value }
    }

    /// Samples the source at `(x, y)`; `None` means the coordinate fell
    /// outside the image bounds and the fill value was used.
    fn sample(&self, image: &GrayImage, x: f32, y: f32) -> Option<u8> {
        let (w, h) = image.dimensions();
        if x < 0.0 || y < 0.0 || x > (w - 1) as f32 || y > (h - 1) as f32 {
            return None;
        }

        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(w - 1);
        let y1 = (y0 + 1).min(h - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let p00 = image.get_pixel(x0, y0).0[0] as f32;
        let p10 = image.get_pixel(x1, y0).0[0] as f32;
        let p01 = image.get_pixel(x0, y1).0[0] as f32;
        let p11 = image.get_pixel(x1, y1).0[0] as f32;

        let top = p00 * (1.0 - fx) + p10 * fx;
        let bottom = p01 * (1.0 - fx) + p11 * fx;
        Some((top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8)
    }
}

impl Remapper for BilinearRemapper {
    #[instrument(skip(self, image, mesh))]
    fn remap(&self, image: &GrayImage, mesh: &Mesh) -> Result<GrayImage, RectifyError> {
        let mut out = GrayImage::new(mesh.width as u32, mesh.height as u32);
        let mut in_bounds = 0usize;
        for row in 0..mesh.height {
            for col in 0..mesh.width {
                let (sx, sy) = mesh.get(row, col);
                let value = match self.sample(image, sx, sy) {
                    Some(v) => {
                        in_bounds += 1;
                        v
                    }
                    None => self.fill_value,
                };
                out.put_pixel(col as u32, row as u32, Luma([value]));
            }
        }

        if in_bounds == 0 {
            return Err(RectifyError::RemapOob("degenerate geometry".to_string()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_mesh_reproduces_source_image() {
        let mut src = GrayImage::new(4, 4);
        for y in 0..4 {
            for x in 0..4 {
                src.put_pixel(x, y, Luma([(x * 10 + y) as u8]));
            }
        }

        let mut mesh = Mesh::new(4, 4);
        for row in 0..4 {
            for col in 0..4 {
                mesh.set(row, col, (col as f32, row as f32));
            }
        }

        let remapper = BilinearRemapper::default();
        let out = remapper.remap(&src, &mesh).expect("fully in-bounds mesh should remap");
        assert_eq!(out.dimensions(), src.dimensions());
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(out.get_pixel(x, y), src.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn partially_out_of_bounds_samples_fill_with_configured_value() {
        let src = GrayImage::from_pixel(2, 2, Luma([200]));
        let mut mesh = Mesh::new(2, 1);
        mesh.set(0, 0, (0.0, 0.0));
        mesh.set(0, 1, (-5.0, -5.0));

        let remapper = BilinearRemapper::new(42);
        let out = remapper.remap(&src, &mesh).expect("one in-bounds sample should still succeed");
        assert_eq!(out.get_pixel(0, 0).0[0], 200);
        assert_eq!(out.get_pixel(1, 0).0[0], 42);
    }

    #[test]
    fn entirely_out_of_bounds_mesh_fails_with_remap_oob() {
        let src = GrayImage::from_pixel(2, 2, Luma([200]));
        let mut mesh = Mesh::new(1, 1);
        mesh.set(0, 0, (-5.0, -5.0));

        let remapper = BilinearRemapper::new(42);
        let err = remapper.remap(&src, &mesh).unwrap_err();
        assert!(matches!(err, RectifyError::RemapOob(_)));
    }

    #[test]
    fn bilinear_interpolation_averages_neighbors() {
        let mut src = GrayImage::new(2, 1);
        src.put_pixel(0, 0, Luma([0]));
        src.put_pixel(1, 0, Luma([100]));

        let mut mesh = Mesh::new(1, 1);
        mesh.set(0, 0, (0.5, 0.0));

        let remapper = BilinearRemapper::default();
        let out = remapper.remap(&src, &mesh).expect("in-bounds mesh should remap");
        assert_eq!(out.get_pixel(0, 0).0[0], 50);
    }
}
