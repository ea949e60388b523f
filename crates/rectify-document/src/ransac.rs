// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Robust (RANSAC) fitting. A small capability trait stands in for the
// inheritance-based model classes of the original source, so the baseline
// fitter and the vanishing-point estimator share one fitting loop.

use nalgebra::Point2;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::model::PolyCurve;

/// A fittable model: `estimate` fits from a minimal (or larger) sample,
/// `residuals` scores every point in the full data set against the fit.
pub trait RansacModel {
    fn min_samples(&self) -> usize;
    fn estimate(&mut self, sample: &[Point2<f64>]) -> bool;
    fn residuals(&self, data: &[Point2<f64>]) -> Vec<f64>;
}

/// Degree-5 polynomial fit of `y = p(x)`, with `x` internally rescaled to
/// `[-1, 1]` for numerical conditioning, matching the original baseline
/// fitter's domain normalization.
#[derive(Debug, Clone)]
pub struct Degree5PolyModel {
    pub curve: PolyCurve,
    pub x_center: f64,
    pub x_scale: f64,
}

impl Default for Degree5PolyModel {
    fn default() -> Self {
        Self {
            curve: PolyCurve::zero(5),
            x_center: 0.0,
            x_scale: 1.0,
        }
    }
}

impl Degree5PolyModel {
    fn normalize(&self, x: f64) -> f64 {
        (x - self.x_center) / self.x_scale
    }

    /// Evaluate the fitted model at an x in original (unnormalized) units.
    pub fn eval(&self, x: f64) -> f64 {
        self.curve.eval(self.normalize(x))
    }
}

impl RansacModel for Degree5PolyModel {
    fn min_samples(&self) -> usize {
        6
    }

    fn estimate(&mut self, sample: &[Point2<f64>]) -> bool {
        if sample.len() < self.min_samples() {
            return false;
        }
        let xmin = sample.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let xmax = sample.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        self.x_center = (xmin + xmax) / 2.0;
        self.x_scale = ((xmax - xmin) / 2.0).max(1e-6);

        let degree = 5;
        let xs: Vec<f64> = sample.iter().map(|p| self.normalize(p.x)).collect();
        let ys: Vec<f64> = sample.iter().map(|p| p.y).collect();
        match fit_polynomial_least_squares(&xs, &ys, degree) {
            Some(coeffs) => {
                let mut curve = PolyCurve::zero(degree);
                curve.coeffs[..=degree].copy_from_slice(&coeffs[..=degree]);
                self.curve = curve;
                true
            }
            None => false,
        }
    }

    fn residuals(&self, data: &[Point2<f64>]) -> Vec<f64> {
        data.iter().map(|p| (p.y - self.eval(p.x)).abs()).collect()
    }
}

/// Fit `x = m*y + b`, used for near-vertical families such as left/right
/// text-column edges where a `y = m*x + b` fit would be ill-conditioned.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearXModel {
    pub m: f64,
    pub b: f64,
}

impl RansacModel for LinearXModel {
    fn min_samples(&self) -> usize {
        2
    }

    fn estimate(&mut self, sample: &[Point2<f64>]) -> bool {
        if sample.len() < 2 {
            return false;
        }
        let n = sample.len() as f64;
        let sy: f64 = sample.iter().map(|p| p.y).sum();
        let sx: f64 = sample.iter().map(|p| p.x).sum();
        let syy: f64 = sample.iter().map(|p| p.y * p.y).sum();
        let sxy: f64 = sample.iter().map(|p| p.x * p.y).sum();
        let denom = n * syy - sy * sy;
        if denom.abs() < 1e-9 {
            return false;
        }
        self.m = (n * sxy - sx * sy) / denom;
        self.b = (sx - self.m * sy) / n;
        true
    }

    fn residuals(&self, data: &[Point2<f64>]) -> Vec<f64> {
        data.iter()
            .map(|p| (p.x - (self.m * p.y + self.b)).abs())
            .collect()
    }
}

/// Ordinary least-squares polynomial fit via the normal equations, solved
/// with Gaussian elimination. `degree + 1` coefficients are returned,
/// lowest order first.
pub fn fit_polynomial_least_squares(xs: &[f64], ys: &[f64], degree: usize) -> Option<Vec<f64>> {
    let n = degree + 1;
    let mut ata = vec![0.0f64; n * n];
    let mut atb = vec![0.0f64; n];

    for (&x, &y) in xs.iter().zip(ys) {
        let mut powers = vec![1.0; n];
        for k in 1..n {
            powers[k] = powers[k - 1] * x;
        }
        for i in 0..n {
            atb[i] += powers[i] * y;
            for j in 0..n {
                ata[i * n + j] += powers[i] * powers[j];
            }
        }
    }

    solve_linear_system(&mut ata, &mut atb, n)
}

/// Solve `A x = b` in place via Gaussian elimination with partial pivoting.
/// `a` is row-major `n x n`; `b` is length `n`. Returns `None` if singular.
fn solve_linear_system(a: &mut [f64], b: &mut [f64], n: usize) -> Option<Vec<f64>> {
    for col in 0..n {
        let mut pivot = col;
        let mut best = a[col * n + col].abs();
        for row in (col + 1)..n {
            let v = a[row * n + col].abs();
            if v > best {
                best = v;
                pivot = row;
            }
        }
        if best < 1e-12 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap(col * n + k, pivot * n + k);
            }
            b.swap(col, pivot);
        }

        let diag = a[col * n + col];
        for row in (col + 1)..n {
            let factor = a[row * n + col] / diag;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row * n + k] -= factor * a[col * n + k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in (row + 1)..n {
            sum -= a[row * n + k] * x[k];
        }
        x[row] = sum / a[row * n + row];
    }
    Some(x)
}

/// Outcome of a RANSAC fit: the model plus which input indices were
/// classified as inliers.
pub struct RansacFit<M> {
    pub model: M,
    pub inliers: Vec<usize>,
}

/// Fit `model` to `data` via RANSAC: repeatedly sample a minimal subset,
/// estimate, score every point, and keep the fit with the most inliers
/// under `threshold`. Deterministic for a fixed `seed`.
pub fn ransac_fit<M: RansacModel + Clone>(
    data: &[Point2<f64>],
    mut model: M,
    threshold: f64,
    iterations: usize,
    seed: u64,
) -> Option<RansacFit<M>> {
    let min_samples = model.min_samples();
    if data.len() < min_samples {
        return None;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut best: Option<(M, Vec<usize>)> = None;
    let mut indices: Vec<usize> = (0..data.len()).collect();

    for _ in 0..iterations {
        indices.shuffle(&mut rng);
        let sample: Vec<Point2<f64>> = indices[..min_samples].iter().map(|&i| data[i]).collect();

        if !model.estimate(&sample) {
            continue;
        }

        let residuals = model.residuals(data);
        let inliers: Vec<usize> = residuals
            .iter()
            .enumerate()
            .filter(|&(_, &r)| r <= threshold)
            .map(|(i, _)| i)
            .collect();

        let better = match &best {
            None => true,
            Some((_, best_inliers)) => inliers.len() > best_inliers.len(),
        };
        if better {
            best = Some((model.clone(), inliers));
        }
    }

    best.map(|(model, inliers)| RansacFit { model, inliers })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ransac_fits_clean_linear_data_with_one_outlier() {
        let mut data: Vec<Point2<f64>> = (0..20)
            .map(|i| {
                let x = i as f64;
                Point2::new(x, 2.0 * x + 1.0)
            })
            .collect();
        data.push(Point2::new(10.0, 500.0)); // gross outlier

        let fit = ransac_fit(&data, LinearXModel::default(), 1e-6, 50, 42);
        // LinearXModel fits x = m*y + b; for our line y = 2x+1, this is
        // x = 0.5*y - 0.5.
        let fit = fit.expect("should find a model");
        assert!(fit.inliers.len() >= 20);
    }

    #[test]
    fn degree5_poly_model_recovers_quadratic() {
        let data: Vec<Point2<f64>> = (-10..=10)
            .map(|i| {
                let x = i as f64;
                Point2::new(x, 0.5 * x * x - 3.0 * x + 2.0)
            })
            .collect();
        let fit = ransac_fit(&data, Degree5PolyModel::default(), 1e-3, 30, 7).unwrap();
        assert_eq!(fit.inliers.len(), data.len());
        assert!((fit.model.eval(4.0) - (0.5 * 16.0 - 12.0 + 2.0)).abs() < 1e-2);
    }

    #[test]
    fn fit_polynomial_least_squares_exact_fit() {
        let xs = vec![-2.0, -1.0, 0.0, 1.0, 2.0];
        let ys: Vec<f64> = xs.iter().map(|&x| 3.0 + 2.0 * x - x * x).collect();
        let coeffs = fit_polynomial_least_squares(&xs, &ys, 2).unwrap();
        assert!((coeffs[0] - 3.0).abs() < 1e-8);
        assert!((coeffs[1] - 2.0).abs() < 1e-8);
        assert!((coeffs[2] - (-1.0)).abs() < 1e-8);
    }
}
