// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Export module — multi-page PDF, single JPG, ZIP of JPGs, output size
// estimation, and download filenames.

pub mod archive;
pub mod estimate;
pub mod naming;
pub mod pdf;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use flatscan_core::error::{Result, ScanError};
use flatscan_core::{ExportSettings, Orientation, Rotation, jpeg_quality, validate_quality};
use tracing::{debug, info, instrument};

use crate::filter::engine::FilteredImage;
use crate::raster;

pub use archive::ZipBuilder;
pub use pdf::{PdfBuilder, PdfMetadata};

/// One page handed to the export engine.
#[derive(Debug, Clone)]
pub struct ExportPage {
    /// Full-resolution filtered page.
    pub image: Arc<FilteredImage>,
    /// Clockwise rotation applied to the raster before encoding.
    pub rotation: Rotation,
    /// Page box orientation, independent of `rotation`.
    pub orientation: Orientation,
}

/// Progress after a page has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportProgress {
    pub completed: usize,
    pub total: usize,
}

/// Shared abort switch, checked between pages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`CancelFlag::cancel`] has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ScanError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A page after rotation, white compositing, and JPEG encoding.
#[derive(Debug, Clone)]
pub struct EncodedPage {
    pub jpeg: Vec<u8>,
    /// Pixel size after rotation.
    pub width: u32,
    pub height: u32,
}

/// Rotate, flatten onto white, and JPEG-encode one page.
///
/// Preview-resolution images are refused: they are lossy downsamples and must
/// never end up in an exported file.
pub fn encode_page(image: &FilteredImage, rotation: Rotation, quality: u8) -> Result<EncodedPage> {
    if !image.is_export_grade() {
        return Err(ScanError::PreviewNotExportable);
    }
    let rotated = raster::rotate(image.image(), rotation);
    let flat = raster::flatten_on_white(&rotated);
    let (width, height) = flat.dimensions();
    let jpeg = raster::to_jpeg_bytes(&flat, quality)?;
    debug!(
        width,
        height,
        rotation = rotation.degrees(),
        bytes = jpeg.len(),
        "Page encoded"
    );
    Ok(EncodedPage {
        jpeg,
        width,
        height,
    })
}

/// Composes filtered pages into output files.
#[derive(Debug, Clone, Copy)]
pub struct ExportEngine {
    settings: ExportSettings,
}

impl ExportEngine {
    pub fn new(settings: ExportSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Build a PDF with one page per input, in input order.
    #[instrument(skip_all, fields(pages = pages.len()))]
    pub fn export_pdf(
        &self,
        pages: &[ExportPage],
        metadata: &PdfMetadata,
        progress: &mut dyn FnMut(ExportProgress),
        cancel: &CancelFlag,
    ) -> Result<Vec<u8>> {
        ensure_not_empty(pages)?;
        info!(paper = ?self.settings.paper_size, "Exporting PDF");
        pdf::write_pdf(pages, &self.settings, metadata, progress, cancel)
    }

    /// Encode a single page as a standalone JPEG.
    #[instrument(skip_all)]
    pub fn export_jpg(&self, page: &ExportPage) -> Result<Vec<u8>> {
        let encoded = encode_page(&page.image, page.rotation, self.settings.jpeg_quality())?;
        info!(bytes = encoded.jpeg.len(), "Exported JPG");
        Ok(encoded.jpeg)
    }

    /// Pack every page as a JPEG into a ZIP archive.
    #[instrument(skip_all, fields(pages = pages.len()))]
    pub fn export_zip(
        &self,
        pages: &[ExportPage],
        progress: &mut dyn FnMut(ExportProgress),
        cancel: &CancelFlag,
    ) -> Result<Vec<u8>> {
        ensure_not_empty(pages)?;
        info!("Exporting ZIP");
        archive::write_zip(pages, self.settings.jpeg_quality(), progress, cancel)
    }

    /// Predict the PDF size, in bytes, that [`ExportEngine::export_pdf`] would
    /// produce at `quality`.
    pub fn estimate_pdf_size(&self, pages: &[ExportPage], quality: f32) -> Result<u64> {
        validate_quality(quality)?;
        estimate::estimate_pdf_size(pages, jpeg_quality(quality))
    }
}

fn ensure_not_empty(pages: &[ExportPage]) -> Result<()> {
    if pages.is_empty() {
        return Err(ScanError::NothingToExport);
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::page;
    use super::*;
    use crate::filter::engine::{FilterEngine, FilterMode};
    use flatscan_core::FilterType;
    use image::{DynamicImage, RgbaImage};

    #[test]
    fn empty_input_is_rejected_before_encoding() {
        let engine = ExportEngine::new(ExportSettings::default()).unwrap();
        let mut calls = 0;
        let err = engine
            .export_pdf(&[], &PdfMetadata::default(), &mut |_| calls += 1, &CancelFlag::new())
            .unwrap_err();
        assert!(matches!(err, ScanError::NothingToExport));
        assert_eq!(calls, 0);

        let err = engine
            .export_zip(&[], &mut |_| {}, &CancelFlag::new())
            .unwrap_err();
        assert!(matches!(err, ScanError::NothingToExport));
    }

    #[test]
    fn preview_images_are_not_exportable() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(10, 10));
        let preview = FilterEngine::default().apply(&img, FilterType::Bw, FilterMode::Preview);
        let err = encode_page(&preview, Rotation::None, 90).unwrap_err();
        assert!(matches!(err, ScanError::PreviewNotExportable));
    }

    #[test]
    fn jpg_export_applies_rotation() {
        let engine = ExportEngine::new(ExportSettings::default()).unwrap();
        let bytes = engine
            .export_jpg(&page(40, 20, [200, 10, 10, 255], Rotation::Cw90))
            .unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 40));
    }

    #[test]
    fn transparent_page_exports_white() {
        let engine = ExportEngine::new(ExportSettings::default()).unwrap();
        let bytes = engine
            .export_jpg(&page(16, 16, [0, 0, 0, 0], Rotation::None))
            .unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert!(decoded.get_pixel(8, 8).0.iter().all(|&c| c >= 250));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let settings = ExportSettings {
            quality: 1.5,
            ..ExportSettings::default()
        };
        assert!(matches!(
            ExportEngine::new(settings),
            Err(ScanError::InvalidSetting(_))
        ));
    }

    #[test]
    fn cancel_flag_trips() {
        let flag = CancelFlag::new();
        assert!(flag.check().is_ok());
        flag.clone().cancel();
        assert!(matches!(flag.check(), Err(ScanError::Cancelled)));
    }
}
