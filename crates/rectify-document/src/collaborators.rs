// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Default implementations of the three external collaborator contracts:
// binarization, line detection, and image remapping. The core pipeline
// only depends on the traits; these defaults let it run standalone rather
// than only describing the contract.

use std::collections::VecDeque;

use image::{GrayImage, Luma};
use rectify_core::RectifyError;
use tracing::{debug, instrument};

use crate::model::{Glyph, RawLine};

/// Grayscale image -> bilevel (0/255) image.
pub trait Binarizer {
    fn binarize(&self, gray: &GrayImage) -> GrayImage;
}

/// Bilevel image -> the dominant character height plus ordered text lines.
pub trait LineDetector {
    fn detect_lines(&self, bw: &GrayImage) -> Result<(u32, Vec<RawLine>), RectifyError>;
}

// -- Binarization --------------------------------------------------------

/// Global threshold chosen automatically via Otsu's method.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtsuBinarizer;

impl Binarizer for OtsuBinarizer {
    #[instrument(skip(self, gray))]
    fn binarize(&self, gray: &GrayImage) -> GrayImage {
        let threshold = otsu_threshold(gray);
        debug!(threshold, "Otsu threshold computed");
        threshold_image(gray, |pixel| if pixel < threshold { 0 } else { 255 })
    }
}

/// Local-mean adaptive threshold via an integral image.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveBinarizer {
    pub block_radius: u32,
    pub c: i32,
}

impl Default for AdaptiveBinarizer {
    fn default() -> Self {
        Self {
            block_radius: 15,
            c: 10,
        }
    }
}

impl Binarizer for AdaptiveBinarizer {
    #[instrument(skip(self, gray))]
    fn binarize(&self, gray: &GrayImage) -> GrayImage {
        let (width, height) = gray.dimensions();
        let integral = compute_integral_image(gray);
        let mut output = GrayImage::new(width, height);

        for y in 0..height {
            for x in 0..width {
                let local_mean = region_mean(&integral, width, height, x, y, self.block_radius);
                let threshold = (local_mean as i32 - self.c).clamp(0, 255) as u8;
                let pixel_val = gray.get_pixel(x, y).0[0];
                let binary = if pixel_val < threshold { 0u8 } else { 255u8 };
                output.put_pixel(x, y, Luma([binary]));
            }
        }

        output
    }
}

fn threshold_image(gray: &GrayImage, f: impl Fn(u8) -> u8) -> GrayImage {
    let (w, h) = gray.dimensions();
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            out.put_pixel(x, y, Luma([f(gray.get_pixel(x, y).0[0])]));
        }
    }
    out
}

fn compute_integral_image(gray: &GrayImage) -> Vec<u64> {
    let (w, h) = gray.dimensions();
    let stride = (w + 1) as usize;
    let mut table = vec![0u64; stride * (h + 1) as usize];

    for y in 0..h {
        let mut row_sum: u64 = 0;
        for x in 0..w {
            row_sum += gray.get_pixel(x, y).0[0] as u64;
            let idx = (y + 1) as usize * stride + (x + 1) as usize;
            let above = y as usize * stride + (x + 1) as usize;
            table[idx] = row_sum + table[above];
        }
    }

    table
}

fn region_mean(integral: &[u64], img_width: u32, img_height: u32, cx: u32, cy: u32, radius: u32) -> f64 {
    let stride = (img_width + 1) as usize;

    let x1 = cx.saturating_sub(radius) as usize;
    let y1 = cy.saturating_sub(radius) as usize;
    let x2 = ((cx + radius + 1) as usize).min(img_width as usize);
    let y2 = ((cy + radius + 1) as usize).min(img_height as usize);

    let area = ((x2 - x1) * (y2 - y1)) as f64;
    if area == 0.0 {
        return 128.0;
    }

    let sum = integral[y2 * stride + x2] as f64 - integral[y1 * stride + x2] as f64
        - integral[y2 * stride + x1] as f64
        + integral[y1 * stride + x1] as f64;

    sum / area
}

fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total_pixels = gray.width() as u64 * gray.height() as u64;
    if total_pixels == 0 {
        return 128;
    }

    let mut sum_total: f64 = 0.0;
    for (i, &count) in histogram.iter().enumerate() {
        sum_total += i as f64 * count as f64;
    }

    let mut sum_background: f64 = 0.0;
    let mut weight_background: u64 = 0;
    let mut max_variance: f64 = 0.0;
    let mut best_threshold: u8 = 0;

    for (t, &count) in histogram.iter().enumerate() {
        weight_background += count;
        if weight_background == 0 {
            continue;
        }
        let weight_foreground = total_pixels - weight_background;
        if weight_foreground == 0 {
            break;
        }

        sum_background += t as f64 * count as f64;
        let mean_background = sum_background / weight_background as f64;
        let mean_foreground = (sum_total - sum_background) / weight_foreground as f64;

        let between_variance =
            weight_background as f64 * weight_foreground as f64 * (mean_background - mean_foreground).powi(2);

        if between_variance > max_variance {
            max_variance = between_variance;
            best_threshold = t as u8;
        }
    }

    best_threshold
}

// -- Line detection --------------------------------------------------------

/// Finds 8-connected foreground (black) blobs and collates them into text
/// lines by vertical overlap: the Rust-native analogue of the original
/// source's (unavailable) `algorithm.letter_contours` / `collate.collate_lines`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectedComponentLineDetector {
    pub min_blob_area: u32,
}

impl LineDetector for ConnectedComponentLineDetector {
    #[instrument(skip(self, bw))]
    fn detect_lines(&self, bw: &GrayImage) -> Result<(u32, Vec<RawLine>), RectifyError> {
        let blobs = find_blobs(bw, self.min_blob_area.max(4));
        if blobs.len() < 2 {
            return Err(RectifyError::NoLines(format!(
                "only {} glyph-like blob(s) detected",
                blobs.len()
            )));
        }

        let ah = median_height(&blobs);
        let rows = collate_into_rows(blobs, ah);
        debug!(ah, rows = rows.len(), "collated blobs into text lines");

        Ok((ah.round().max(1.0) as u32, rows))
    }
}

fn find_blobs(bw: &GrayImage, min_area: u32) -> Vec<Glyph> {
    let (w, h) = bw.dimensions();
    let mut visited = vec![false; (w * h) as usize];
    let mut blobs = Vec::new();

    let is_fg = |x: u32, y: u32| bw.get_pixel(x, y).0[0] < 128;

    for y0 in 0..h {
        for x0 in 0..w {
            let idx0 = (y0 * w + x0) as usize;
            if visited[idx0] || !is_fg(x0, y0) {
                continue;
            }

            let mut queue = VecDeque::new();
            queue.push_back((x0, y0));
            visited[idx0] = true;

            let (mut min_x, mut min_y) = (x0, y0);
            let (mut max_x, mut max_y) = (x0, y0);
            let mut contour = Vec::new();
            let mut area = 0u32;

            while let Some((x, y)) = queue.pop_front() {
                area += 1;
                contour.push((x as i32, y as i32));
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);

                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = x as i32 + dx;
                        let ny = y as i32 + dy;
                        if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                            continue;
                        }
                        let (nx, ny) = (nx as u32, ny as u32);
                        let nidx = (ny * w + nx) as usize;
                        if !visited[nidx] && is_fg(nx, ny) {
                            visited[nidx] = true;
                            queue.push_back((nx, ny));
                        }
                    }
                }
            }

            if area >= min_area {
                let mut glyph = Glyph::new(
                    min_x as f64,
                    min_y as f64,
                    (max_x - min_x + 1) as f64,
                    (max_y - min_y + 1) as f64,
                );
                glyph.contour = contour;
                blobs.push(glyph);
            }
        }
    }

    blobs
}

fn median_height(blobs: &[Glyph]) -> f64 {
    let mut heights: Vec<f64> = blobs.iter().map(|g| g.h).collect();
    heights.sort_by(|a, b| a.partial_cmp(b).unwrap());
    heights[heights.len() / 2]
}

/// Greedily groups blobs into rows by proximity of vertical center to a
/// running row average, then orders each row left-to-right.
fn collate_into_rows(mut blobs: Vec<Glyph>, ah: f64) -> Vec<RawLine> {
    blobs.sort_by(|a, b| a.midpoint().y.partial_cmp(&b.midpoint().y).unwrap());

    let mut rows: Vec<Vec<Glyph>> = Vec::new();
    let row_tol = (ah * 0.6).max(1.0);

    for blob in blobs {
        let y_mid = blob.midpoint().y;
        let mut placed = false;
        for row in rows.iter_mut() {
            let row_avg = row.iter().map(|g| g.midpoint().y).sum::<f64>() / row.len() as f64;
            if (y_mid - row_avg).abs() < row_tol {
                row.push(blob.clone());
                placed = true;
                break;
            }
        }
        if !placed {
            rows.push(vec![blob]);
        }
    }

    rows.into_iter()
        .map(|mut glyphs| {
            glyphs.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap());
            RawLine { glyphs }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otsu_binarizer_separates_two_clear_intensity_bands() {
        let mut img = GrayImage::from_pixel(20, 20, Luma([30]));
        for y in 0..10 {
            for x in 0..20 {
                img.put_pixel(x, y, Luma([220]));
            }
        }
        let out = OtsuBinarizer.binarize(&img);
        assert_eq!(out.get_pixel(0, 0).0[0], 255);
        assert_eq!(out.get_pixel(0, 15).0[0], 0);
    }

    #[test]
    fn adaptive_binarizer_preserves_dimensions() {
        let img = GrayImage::from_pixel(40, 30, Luma([128]));
        let out = AdaptiveBinarizer::default().binarize(&img);
        assert_eq!(out.dimensions(), img.dimensions());
    }

    #[test]
    fn connected_component_detector_finds_two_rows() {
        let mut bw = GrayImage::from_pixel(200, 100, Luma([255]));
        for x in 10..190 {
            for y in 20..30 {
                bw.put_pixel(x, y, Luma([0]));
            }
            for y in 60..70 {
                bw.put_pixel(x, y, Luma([0]));
            }
        }
        // Break each band into separate glyph blobs.
        for x in (10..190).step_by(20) {
            for y in 20..30 {
                bw.put_pixel(x, y, Luma([255]));
            }
            for y in 60..70 {
                bw.put_pixel(x, y, Luma([255]));
            }
        }

        let detector = ConnectedComponentLineDetector::default();
        let (ah, rows) = detector.detect_lines(&bw).expect("should detect lines");
        assert_eq!(rows.len(), 2);
        assert!(ah > 0);
    }

    #[test]
    fn connected_component_detector_fails_on_blank_image() {
        let bw = GrayImage::from_pixel(50, 50, Luma([255]));
        let detector = ConnectedComponentLineDetector::default();
        assert!(detector.detect_lines(&bw).is_err());
    }
}
