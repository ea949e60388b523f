// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Tunables for the page-rectification pipeline.
///
/// Every numeric default below matches the constants used in the original
/// `kim2014` reference implementation this pipeline is built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Options {
    /// Camera focal length in pixels.
    pub focal_length_px: f64,
    /// Degree `D` of the surface polynomial `g`.
    pub polynomial_degree: usize,
    /// RNG seed used by every RANSAC fit, for reproducible runs.
    pub ransac_seed: u64,
    /// Number of interior x-samples used by vanishing-point refinement.
    pub n_longs: usize,
    /// Number of vanishing-point refinement iterations.
    pub refine_iters: usize,
    /// Levenberg-Marquardt `ftol` stopping tolerance.
    pub ftol: f64,
    /// If set, intermediate diagnostic images are written here.
    pub debug_dir: Option<PathBuf>,
    /// Override for the output aspect ratio; `None` uses the computed value.
    pub aspect_ratio: Option<f64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            focal_length_px: 3270.5,
            polynomial_degree: 7,
            ransac_seed: 0x5EED,
            n_longs: 15,
            refine_iters: 5,
            ftol: 1e-2,
            debug_dir: None,
            aspect_ratio: None,
        }
    }
}

impl Options {
    /// Load options from a TOML config file, falling back to defaults for
    /// any field the file omits.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let opts = Options::default();
        assert_eq!(opts.focal_length_px, 3270.5);
        assert_eq!(opts.polynomial_degree, 7);
        assert_eq!(opts.n_longs, 15);
        assert_eq!(opts.refine_iters, 5);
        assert_eq!(opts.ftol, 1e-2);
        assert!(opts.debug_dir.is_none());
        assert!(opts.aspect_ratio.is_none());
    }

    #[test]
    fn round_trips_through_toml() {
        let opts = Options::default();
        let text = toml::to_string(&opts).expect("serialize");
        let parsed = Options::from_toml_str(&text).expect("parse");
        assert_eq!(opts, parsed);
    }
}
