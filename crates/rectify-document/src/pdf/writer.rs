// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer — assemble rectified page images into a single PDF using
// `printpdf` 0.8.
//
// printpdf 0.8 uses a data-oriented API: documents are built by constructing
// `PdfPage` structs containing `Vec<Op>` operation lists, then serialised via
// `PdfDocument::save()`.

use std::path::Path;

use printpdf::{Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData, RawImageFormat, XObjectTransform};
use rectify_core::RectifyError;
use tracing::{debug, info, instrument};

const MM_PER_INCH: f32 = 25.4;

/// Assembles one or more raster page images into a single PDF, one page
/// per image, each page sized to the image's pixel dimensions at the given
/// DPI.
pub struct PdfWriter {
    /// Title metadata embedded in the PDF /Info dictionary.
    title: Option<String>,
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self { title: None }
    }
}

impl PdfWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a title for the PDF metadata.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    fn page_dimensions_mm(width_px: u32, height_px: u32, dpi: f32) -> (Mm, Mm) {
        let w_mm = width_px as f32 / dpi * MM_PER_INCH;
        let h_mm = height_px as f32 / dpi * MM_PER_INCH;
        (Mm(w_mm), Mm(h_mm))
    }

    fn decode_image(image_bytes: &[u8]) -> Result<RawImage, RectifyError> {
        let dynamic_image = ::image::load_from_memory(image_bytes)
            .map_err(|err| RectifyError::ImageError(format!("failed to decode image for PDF: {}", err)))?;

        let img_width = dynamic_image.width() as usize;
        let img_height = dynamic_image.height() as usize;
        let rgb_image = dynamic_image.to_rgb8();
        Ok(RawImage {
            pixels: RawImageData::U8(rgb_image.into_raw()),
            width: img_width,
            height: img_height,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        })
    }

    /// Create a single-page PDF containing the given image, tagged at `dpi`.
    #[instrument(skip(self, image_bytes), fields(bytes_len = image_bytes.len()))]
    pub fn create_from_image(&self, image_bytes: &[u8], dpi: f32) -> Result<Vec<u8>, RectifyError> {
        self.create_from_images(&[image_bytes.to_vec()], dpi)
    }

    /// Create a multi-page PDF, one page per image, in order.
    #[instrument(skip(self, images), fields(pages = images.len()))]
    pub fn create_from_images(&self, images: &[Vec<u8>], dpi: f32) -> Result<Vec<u8>, RectifyError> {
        let title = self.title.as_deref().unwrap_or("Rectified Document");
        info!(pages = images.len(), dpi, title, "assembling PDF");

        let mut doc = PdfDocument::new(title);
        let mut pages = Vec::with_capacity(images.len());

        for image_bytes in images {
            let raw = Self::decode_image(image_bytes)?;
            let (page_w, page_h) = Self::page_dimensions_mm(raw.width as u32, raw.height as u32, dpi);
            let xobject_id = doc.add_image(&raw);

            let ops = vec![Op::UseXobject {
                id: xobject_id,
                transform: XObjectTransform {
                    translate_x: Some(Pt(0.0)),
                    translate_y: Some(Pt(0.0)),
                    scale_x: None,
                    scale_y: None,
                    dpi: Some(dpi),
                    rotate: None,
                },
            }];
            debug!(page_w = page_w.0, page_h = page_h.0, "page placed");
            pages.push(PdfPage::new(page_w, page_h, ops));
        }

        if pages.is_empty() {
            pages.push(PdfPage::new(Mm(210.0), Mm(297.0), Vec::new()));
        }

        doc.with_pages(pages);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        Ok(doc.save(&PdfSaveOptions::default(), &mut warnings))
    }

    /// Create a multi-page PDF and write it directly to a file.
    pub fn write_images_to_file(&self, images: &[Vec<u8>], dpi: f32, path: impl AsRef<Path>) -> Result<(), RectifyError> {
        let bytes = self.create_from_images(images, dpi)?;
        std::fs::write(path.as_ref(), &bytes)?;
        info!("wrote PDF to {}", path.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_png() -> Vec<u8> {
        let img = ::image::RgbImage::from_pixel(4, 4, ::image::Rgb([200, 200, 200]));
        let mut bytes = Vec::new();
        ::image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), ::image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn single_image_pdf_is_nonempty() {
        let writer = PdfWriter::new();
        let pdf = writer.create_from_image(&tiny_png(), 300.0).unwrap();
        assert!(!pdf.is_empty());
        assert_eq!(&pdf[0..4], b"%PDF");
    }

    #[test]
    fn multi_page_pdf_assembles_all_images() {
        let writer = PdfWriter::new();
        let images = vec![tiny_png(), tiny_png(), tiny_png()];
        let pdf = writer.create_from_images(&images, 300.0).unwrap();
        assert!(!pdf.is_empty());
    }
}
