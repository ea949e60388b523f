// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Batch driver: rectifies every page image found under one or more input
//! directories (or a single file via `-f`), writes DPI-tagged output
//! images into `outdir`, and assembles them into a combined PDF.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::Parser;
use image::ImageFormat;
use rectify_core::{Options, RectifyError};
use rectify_document::rectify_image;
use rectify_document::pdf::writer::PdfWriter;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "rectify", version, about = "Page-curvature dewarping batch driver")]
struct Args {
    /// Directory to write rectified page images and the combined PDF into.
    outdir: PathBuf,
    /// One or more directories to scan for page images (png/jpg/tif).
    indirs: Vec<PathBuf>,
    /// Run on a single file instead of scanning `indirs`.
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,
    /// Number of worker threads to rectify pages concurrently.
    #[arg(short = 'c', long = "concurrent", default_value_t = 1)]
    concurrent: usize,
    /// Force a particular output DPI instead of the source image's own.
    #[arg(short = 'd', long = "dpi")]
    dpi: Option<u32>,
}

fn is_page_image(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref(),
        Some("png") | Some("jpg") | Some("jpeg") | Some("tif") | Some("tiff")
    )
}

fn collect_inputs(indirs: &[PathBuf]) -> Result<Vec<PathBuf>, RectifyError> {
    let mut files = Vec::new();
    for dir in indirs {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_page_image(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn rectify_one(path: &Path, opts: &Options, dpi_override: Option<u32>) -> Result<(Vec<u8>, u32), RectifyError> {
    let source = image::open(path).map_err(|err| RectifyError::ImageError(format!("failed to open {}: {}", path.display(), err)))?;
    let dpi = dpi_override.unwrap_or_else(|| estimate_dpi(source.height()));
    let rectified = rectify_image(&source, opts)?;

    let mut bytes = Vec::new();
    rectified
        .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|err| RectifyError::ImageError(format!("failed to encode {}: {}", path.display(), err)))?;
    Ok((bytes, dpi))
}

/// Estimate a plausible scan DPI from page height, rounding to the nearest
/// hundred, assuming a roughly 11-inch-tall page.
fn estimate_dpi(height_px: u32) -> u32 {
    ((height_px as f64 / 1100.0).round() * 100.0).max(100.0) as u32
}

fn run(args: Args) -> Result<(), RectifyError> {
    std::fs::create_dir_all(&args.outdir)?;
    let opts = Options::default();

    let inputs = match &args.file {
        Some(single) => vec![single.clone()],
        None => collect_inputs(&args.indirs)?,
    };

    if inputs.is_empty() {
        warn!("no page images found");
        return Ok(());
    }

    let queue = Mutex::new(inputs.into_iter().enumerate().collect::<Vec<_>>());
    let results: Mutex<Vec<(usize, Vec<u8>, u32)>> = Mutex::new(Vec::new());
    let workers = args.concurrent.max(1);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let next = queue.lock().unwrap().pop();
                let Some((idx, path)) = next else { break };
                info!(path = %path.display(), "rectifying page");
                match rectify_one(&path, &opts, args.dpi) {
                    Ok((bytes, dpi)) => {
                        let out_path = args.outdir.join(format!("page_{idx:04}.png"));
                        if let Err(err) = std::fs::write(&out_path, &bytes) {
                            error!(path = %out_path.display(), %err, "failed to write output page");
                            continue;
                        }
                        results.lock().unwrap().push((idx, bytes, dpi));
                    }
                    Err(err) => {
                        error!(path = %path.display(), %err, "failed to rectify page");
                    }
                }
            });
        }
    });

    let mut pages = results.into_inner().unwrap();
    pages.sort_by_key(|(idx, _, _)| *idx);
    if pages.is_empty() {
        return Err(RectifyError::RemapOob("no pages rectified successfully".to_string()));
    }

    let dpi = pages.iter().map(|(_, _, dpi)| *dpi).max().unwrap_or(300) as f32;
    let images: Vec<Vec<u8>> = pages.into_iter().map(|(_, bytes, _)| bytes).collect();

    let writer = PdfWriter::new();
    let pdf_path = args.outdir.join("out.pdf");
    writer.write_images_to_file(&images, dpi, &pdf_path)?;
    info!(path = %pdf_path.display(), "wrote combined PDF");

    Ok(())
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    if let Err(err) = run(args) {
        error!(%err, "rectify-cli failed");
        std::process::exit(1);
    }
}
