// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Baseline fitting: per-line robust degree-5 polynomial fit, outlier
// rejection, and a greedy merge pass joining near-collinear lines.

use nalgebra::Point2;
use rectify_core::RectifyError;

use crate::model::{Glyph, RawLine, TextLine};
use crate::ransac::{ransac_fit, Degree5PolyModel};

const MIN_LINE_LEN: usize = 5;
const RANSAC_ITERS: usize = 10;
const MERGE_RANSAC_THRESHOLD_DIVISOR: f64 = 15.0;

fn to_text_line(glyphs: Vec<Glyph>, model: &Degree5PolyModel) -> TextLine {
    let x_left = glyphs
        .iter()
        .map(|g| g.base_point().x)
        .fold(f64::INFINITY, f64::min);
    let x_right = glyphs
        .iter()
        .map(|g| g.base_point().x)
        .fold(f64::NEG_INFINITY, f64::max);
    TextLine {
        glyphs,
        baseline: model.curve,
        x_center: model.x_center,
        x_scale: model.x_scale,
        x_left,
        x_right,
    }
}

/// Fit a robust baseline to every raw detected line, dropping lines shorter
/// than [`MIN_LINE_LEN`] and any glyph RANSAC classifies as an outlier.
pub fn fit_baselines(
    raw_lines: &[RawLine],
    ah: f64,
    seed: u64,
) -> Result<Vec<TextLine>, RectifyError> {
    let mut out = Vec::new();

    for (i, raw) in raw_lines.iter().enumerate() {
        if raw.glyphs.len() < MIN_LINE_LEN {
            continue;
        }
        let points: Vec<Point2<f64>> = raw.glyphs.iter().map(|g| g.base_point()).collect();
        let threshold = (ah / 10.0).max(1e-6);

        let fit = ransac_fit(
            &points,
            Degree5PolyModel::default(),
            threshold,
            RANSAC_ITERS,
            seed.wrapping_add(i as u64),
        );

        let Some(fit) = fit else { continue };
        if fit.inliers.len() < MIN_LINE_LEN {
            continue;
        }

        let inlier_glyphs: Vec<Glyph> = fit
            .inliers
            .iter()
            .map(|&idx| raw.glyphs[idx].clone())
            .collect();
        out.push(to_text_line(inlier_glyphs, &fit.model));
    }

    if out.len() < 2 {
        return Err(RectifyError::NoLines(format!(
            "only {} usable text line(s) found; need at least 2",
            out.len()
        )));
    }

    Ok(out)
}

/// Greedy merge pass: walk lines sorted top-to-bottom; if the average gap
/// between a line and the previous merged line (over their x-overlap) is
/// small relative to `ah`, merge their glyphs and re-fit with a tighter
/// threshold.
pub fn merge_lines(mut lines: Vec<TextLine>, ah: f64, seed: u64) -> Vec<TextLine> {
    if lines.len() < 2 {
        return lines;
    }
    lines.sort_by(|a, b| {
        let ya = a.eval((a.x_left + a.x_right) / 2.0);
        let yb = b.eval((b.x_left + b.x_right) / 2.0);
        ya.partial_cmp(&yb).unwrap_or(std::cmp::Ordering::Equal)
    });

    let merge_tol = ah / 8.0;
    let tight_threshold = (ah / MERGE_RANSAC_THRESHOLD_DIVISOR).max(1e-6);

    let mut merged: Vec<TextLine> = Vec::with_capacity(lines.len());
    merged.push(lines.remove(0));

    for (i, line) in lines.into_iter().enumerate() {
        let prev = merged.last().unwrap();
        let avg_gap = match prev.x_overlap(&line) {
            Some((lo, hi)) if hi > lo => {
                const SAMPLES: usize = 10;
                let mut sum = 0.0;
                for k in 0..SAMPLES {
                    let x = lo + (hi - lo) * (k as f64) / ((SAMPLES - 1) as f64);
                    sum += (prev.eval(x) - line.eval(x)).abs();
                }
                sum / SAMPLES as f64
            }
            _ => f64::INFINITY,
        };

        if avg_gap < merge_tol {
            let mut glyphs = prev.glyphs.clone();
            glyphs.extend(line.glyphs.iter().cloned());
            let points: Vec<Point2<f64>> = glyphs.iter().map(|g| g.base_point()).collect();

            if let Some(fit) = ransac_fit(
                &points,
                Degree5PolyModel::default(),
                tight_threshold,
                RANSAC_ITERS,
                seed.wrapping_add(1000 + i as u64),
            ) {
                let inlier_glyphs: Vec<Glyph> = fit
                    .inliers
                    .iter()
                    .map(|&idx| glyphs[idx].clone())
                    .collect();
                if inlier_glyphs.len() >= MIN_LINE_LEN {
                    let new_merged = to_text_line(inlier_glyphs, &fit.model);
                    *merged.last_mut().unwrap() = new_merged;
                    continue;
                }
            }
            // Merge fit failed or degenerate: keep both lines separate.
            merged.push(line);
        } else {
            merged.push(line);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_raw_line(y: f64, n: usize, spacing: f64) -> RawLine {
        RawLine {
            glyphs: (0..n)
                .map(|i| Glyph::new(i as f64 * spacing, y - 8.0, 6.0, 8.0))
                .collect(),
        }
    }

    #[test]
    fn fit_baselines_drops_short_lines() {
        let raw = vec![
            straight_raw_line(100.0, 8, 20.0),
            RawLine {
                glyphs: vec![Glyph::new(0.0, 0.0, 5.0, 5.0); 2],
            },
        ];
        let fitted = fit_baselines(&raw, 12.0, 1).unwrap();
        assert_eq!(fitted.len(), 1);
    }

    #[test]
    fn fit_baselines_requires_two_lines() {
        let raw = vec![straight_raw_line(100.0, 8, 20.0)];
        assert!(fit_baselines(&raw, 12.0, 1).is_err());
    }

    #[test]
    fn merge_joins_near_identical_lines() {
        let raw = vec![
            straight_raw_line(100.0, 8, 20.0),
            straight_raw_line(100.5, 8, 20.0),
        ];
        let fitted = fit_baselines(&raw, 12.0, 1).unwrap();
        let merged = merge_lines(fitted, 12.0, 1);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn merge_keeps_distinct_rows_separate() {
        let raw = vec![
            straight_raw_line(100.0, 8, 20.0),
            straight_raw_line(160.0, 8, 20.0),
        ];
        let fitted = fit_baselines(&raw, 12.0, 1).unwrap();
        let merged = merge_lines(fitted, 12.0, 1);
        assert_eq!(merged.len(), 2);
    }
}
