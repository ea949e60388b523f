// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! rectify-document — page-curvature dewarping pipeline.
//!
//! Recovers camera orientation and a cylindrical page-surface polynomial
//! from detected text baselines via a joint nonlinear least-squares
//! optimization, then resamples the source photo through the recovered
//! surface into a flat, horizontally-aligned image.

pub mod baseline;
pub mod camera;
pub mod collaborators;
pub mod geometry;
pub mod image;
pub mod mesh;
pub mod model;
pub mod newton;
pub mod optimize;
pub mod pdf;
pub mod ransac;
pub mod rectify;
pub mod remap;
pub mod vanishing;

pub use collaborators::{AdaptiveBinarizer, Binarizer, ConnectedComponentLineDetector, LineDetector, OtsuBinarizer};
pub use image::processor::ImageProcessor;
pub use pdf::writer::PdfWriter;
pub use rectify::{rectify_image, rectify_page, rectify_page_with, Pipeline};
pub use remap::{BilinearRemapper, Remapper};
