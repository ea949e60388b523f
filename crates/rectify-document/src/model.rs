// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Domain types shared across the rectification pipeline: glyphs, text
// lines, the surface polynomial, and the output sampling mesh.

use nalgebra::Point2;

use crate::geometry::Box2D;

/// Maximum supported degree for [`PolyCurve`]; fixed so the analytic
/// derivative and Jacobian columns never need dynamic allocation.
pub const MAX_DEGREE: usize = 12;

/// A single detected connected-component ("letter-ish blob") on the page.
#[derive(Debug, Clone)]
pub struct Glyph {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    /// Integer contour points, in the collaborator's native pixel space.
    pub contour: Vec<(i32, i32)>,
}

impl Glyph {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            x,
            y,
            w,
            h,
            contour: Vec::new(),
        }
    }

    /// Bottom-center point of the glyph's bounding box.
    pub fn base_point(&self) -> Point2<f64> {
        Point2::new(self.x + self.w / 2.0, self.y + self.h)
    }

    pub fn corners(&self) -> [Point2<f64>; 4] {
        [
            Point2::new(self.x, self.y),
            Point2::new(self.x + self.w, self.y),
            Point2::new(self.x + self.w, self.y + self.h),
            Point2::new(self.x, self.y + self.h),
        ]
    }

    pub fn midpoint(&self) -> Point2<f64> {
        Point2::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn bbox(&self) -> Box2D {
        Box2D {
            x0: self.x,
            y0: self.y,
            x1: self.x + self.w,
            y1: self.y + self.h,
        }
    }
}

/// Raw output of a [`crate::collaborators::LineDetector`]: glyphs for one
/// text line, left-to-right, before baseline fitting.
#[derive(Debug, Clone, Default)]
pub struct RawLine {
    pub glyphs: Vec<Glyph>,
}

/// A fixed-capacity polynomial `g(X) = sum_{k=0..=degree} coeffs[k] * X^k`,
/// with `coeffs[0]` forced to zero by convention (the surface passes
/// through the origin of the world X-axis).
#[derive(Debug, Clone, Copy)]
pub struct PolyCurve {
    pub coeffs: [f64; MAX_DEGREE + 1],
    pub degree: usize,
}

impl PolyCurve {
    pub fn zero(degree: usize) -> Self {
        assert!(degree <= MAX_DEGREE);
        Self {
            coeffs: [0.0; MAX_DEGREE + 1],
            degree,
        }
    }

    /// Build from the non-constant coefficients `a_1..=a_degree` (the
    /// `a_m` vector of the joint optimizer); `a_0` is always 0.
    pub fn from_am(am: &[f64]) -> Self {
        let degree = am.len();
        let mut c = Self::zero(degree);
        for (k, &v) in am.iter().enumerate() {
            c.coeffs[k + 1] = v;
        }
        c
    }

    pub fn am(&self) -> Vec<f64> {
        self.coeffs[1..=self.degree].to_vec()
    }

    pub fn eval(&self, x: f64) -> f64 {
        let mut acc = 0.0;
        for k in (0..=self.degree).rev() {
            acc = acc * x + self.coeffs[k];
        }
        acc
    }

    /// Analytic first derivative `g'(x)`.
    pub fn deriv(&self, x: f64) -> f64 {
        let mut acc = 0.0;
        for k in (1..=self.degree).rev() {
            acc = acc * x + self.coeffs[k] * k as f64;
        }
        acc
    }

    /// `x^k` for `k = 0..=degree`, used directly by the optimizer's
    /// Jacobian columns with respect to `a_k`.
    pub fn powers(&self, x: f64) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.degree + 1);
        let mut p = 1.0;
        for _ in 0..=self.degree {
            out.push(p);
            p *= x;
        }
        out
    }
}

/// A detected text line together with its fitted baseline polynomial
/// `y = p(x)`, in image coordinates, over the domain `[x_left, x_right]`.
#[derive(Debug, Clone)]
pub struct TextLine {
    pub glyphs: Vec<Glyph>,
    /// Baseline polynomial, fitted over `x` normalized to `[-1, 1]` via
    /// `x_center`/`x_scale`.
    pub baseline: PolyCurve,
    pub x_center: f64,
    pub x_scale: f64,
    pub x_left: f64,
    pub x_right: f64,
}

impl TextLine {
    pub fn width(&self) -> f64 {
        self.x_right - self.x_left
    }

    fn normalize(&self, x: f64) -> f64 {
        (x - self.x_center) / self.x_scale
    }

    /// Evaluate the baseline at an x in original (image-pixel) units.
    pub fn eval(&self, x: f64) -> f64 {
        self.baseline.eval(self.normalize(x))
    }

    /// Derivative of the baseline with respect to image-pixel x.
    pub fn deriv(&self, x: f64) -> f64 {
        self.baseline.deriv(self.normalize(x)) / self.x_scale
    }

    /// Overlap of this line's x-domain with `other`'s, or `None` if disjoint.
    pub fn x_overlap(&self, other: &TextLine) -> Option<(f64, f64)> {
        let lo = self.x_left.max(other.x_left);
        let hi = self.x_right.min(other.x_right);
        if hi > lo { Some((lo, hi)) } else { None }
    }
}

/// A dense `(H, W, 2)` coordinate mesh mapping rectified-image pixels back
/// to source-image sampling coordinates. `coords[row][col] = (src_x, src_y)`.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub width: usize,
    pub height: usize,
    pub coords: Vec<(f32, f32)>,
}

impl Mesh {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            coords: vec![(0.0, 0.0); width * height],
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> (f32, f32) {
        self.coords[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: (f32, f32)) {
        self.coords[row * self.width + col] = value;
    }
}
