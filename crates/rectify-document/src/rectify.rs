// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline entry point: wires the collaborator contracts and the core
// geometry/optimizer/mesh modules into the single `rectify_page` operation.

use image::{DynamicImage, GrayImage};
use nalgebra::Point2;
use rectify_core::{Options, RectifyError};
use tracing::{info, instrument, warn};

use crate::baseline::{fit_baselines, merge_lines};
use crate::camera::{r_theta, PrincipalPoint};
use crate::collaborators::{Binarizer, ConnectedComponentLineDetector, LineDetector, OtsuBinarizer};
use crate::mesh::build_mesh;
use crate::model::PolyCurve;
use crate::optimize::{initial_guess, levenberg_marquardt, unpack, OptimizerContext};
use crate::remap::{BilinearRemapper, Remapper};
use crate::vanishing::{initial_vanishing_point, refine_vanishing_point};

/// Collaborator set consumed by [`rectify_page`]. Defaults to
/// [`OtsuBinarizer`], [`ConnectedComponentLineDetector`], and
/// [`BilinearRemapper`] via [`Pipeline::default`].
pub struct Pipeline<'a> {
    pub binarizer: &'a dyn Binarizer,
    pub line_detector: &'a dyn LineDetector,
    pub remapper: &'a dyn Remapper,
}

impl Default for Pipeline<'static> {
    fn default() -> Self {
        static BIN: OtsuBinarizer = OtsuBinarizer;
        static DET: ConnectedComponentLineDetector = ConnectedComponentLineDetector { min_blob_area: 4 };
        static REM: BilinearRemapper = BilinearRemapper { fill_value: 0 };
        Self {
            binarizer: &BIN,
            line_detector: &DET,
            remapper: &REM,
        }
    }
}

/// Rectify a single grayscale page image using the default collaborator
/// implementations.
pub fn rectify_page(image: &GrayImage, opts: &Options) -> Result<GrayImage, RectifyError> {
    rectify_page_with(image, opts, &Pipeline::default())
}

/// Convenience wrapper accepting any [`DynamicImage`], converting to
/// grayscale internally and returning a grayscale [`DynamicImage`].
pub fn rectify_image(image: &DynamicImage, opts: &Options) -> Result<DynamicImage, RectifyError> {
    let gray = image.to_luma8();
    let out = rectify_page(&gray, opts)?;
    Ok(DynamicImage::ImageLuma8(out))
}

/// Rectify a single grayscale page image with explicit collaborators.
#[instrument(skip(image, opts, pipeline))]
pub fn rectify_page_with(image: &GrayImage, opts: &Options, pipeline: &Pipeline) -> Result<GrayImage, RectifyError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(RectifyError::InputShape("image has zero width or height".to_string()));
    }

    let bw = pipeline.binarizer.binarize(image);
    let (ah, raw_lines) = pipeline.line_detector.detect_lines(&bw)?;
    let ah = ah as f64;

    let fitted = fit_baselines(&raw_lines, ah, opts.ransac_seed)?;
    let lines = merge_lines(fitted, ah, opts.ransac_seed);
    if lines.len() < 2 {
        return Err(RectifyError::NoLines(format!(
            "only {} baseline(s) survived merging",
            lines.len()
        )));
    }

    let o = PrincipalPoint::for_image(width, height);
    let f = opts.focal_length_px;

    let v0 = initial_vanishing_point(&lines, ah, opts.ransac_seed);
    let v = refine_vanishing_point(v0, &lines, o, f, opts.n_longs, opts.refine_iters);

    match run_optimizer(&lines, v, o, f, opts) {
        Ok((r, g)) => {
            let mesh = build_mesh(&lines, o, &r, &g, f, ah, opts.aspect_ratio)?;
            let rectified = pipeline.remapper.remap(image, &mesh)?;
            info!(width = mesh.width, height = mesh.height, "page rectified");
            Ok(rectified)
        }
        Err(RectifyError::OptimizerDiverges(reason)) => {
            warn!(reason, "optimizer diverged, falling back to identity remap of source");
            Ok(image.clone())
        }
        Err(err) => Err(err),
    }
}

fn run_optimizer(
    lines: &[crate::model::TextLine],
    v: Point2<f64>,
    o: PrincipalPoint,
    f: f64,
    opts: &Options,
) -> Result<(nalgebra::Matrix3<f64>, PolyCurve), RectifyError> {
    let ctx = OptimizerContext::from_lines(lines, o, f, opts.polynomial_degree);
    let initial = initial_guess(lines, v, o, f, opts.polynomial_degree);
    let solved = levenberg_marquardt(initial, &ctx, opts.ftol)?;
    let (theta, am, _align, _l) = unpack(&solved, opts.polynomial_degree, lines.len());
    Ok((r_theta(theta), PolyCurve::from_am(&am)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn striped_page(w: u32, h: u32, ys: &[u32]) -> GrayImage {
        let mut img = GrayImage::from_pixel(w, h, Luma([255]));
        for &y0 in ys {
            for y in y0..(y0 + 10).min(h) {
                for x in 100..(w - 100).max(101) {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        img
    }

    #[test]
    fn rejects_zero_sized_image() {
        let img = GrayImage::new(0, 0);
        let opts = Options::default();
        let err = rectify_page(&img, &opts).unwrap_err();
        assert!(matches!(err, RectifyError::InputShape(_)));
    }

    #[test]
    fn flat_page_with_enough_stripes_rectifies_without_error() {
        let img = striped_page(800, 600, &[150, 300, 450]);
        let opts = Options {
            focal_length_px: 3270.5,
            ..Options::default()
        };
        let result = rectify_page(&img, &opts);
        assert!(result.is_ok(), "expected rectification to succeed: {:?}", result.err());
    }
}
