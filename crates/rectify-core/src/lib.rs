// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// rectify-core — Options, error types, and small shared domain types used
// across the page-rectification pipeline.

pub mod config;
pub mod error;

pub use config::Options;
pub use error::RectifyError;
