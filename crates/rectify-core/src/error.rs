// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for the page-rectification pipeline.

use thiserror::Error;

/// Top-level error type for all rectification operations.
#[derive(Debug, Error)]
pub enum RectifyError {
    // -- Input validation --
    #[error("input image is not a well-formed 2-D grayscale array: {0}")]
    InputShape(String),

    // -- Line detection / baseline fitting --
    #[error("insufficient text: {0}")]
    NoLines(String),

    #[error("robust fit found no inlier model: {0}")]
    RansacNoModel(String),

    // -- Ray-surface intersection --
    #[error("ray-surface intersection did not converge after {iterations} iterations")]
    NewtonNonConvergent { iterations: u32 },

    // -- Joint optimizer --
    #[error("optimizer diverged: {0}")]
    OptimizerDiverges(String),

    // -- Mesh / remap --
    #[error("degenerate geometry: {0}")]
    RemapOob(String),

    // -- Ambient (driver / I/O) --
    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RectifyError>;
