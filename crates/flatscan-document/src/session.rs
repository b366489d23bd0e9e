// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan session — the ordered page list and the filter cache that hangs off it.
//
// The session is the only place a page's cropped raster changes, so it is also
// the only place cache entries are invalidated. Batch operations walk pages in
// list order and yield to the runtime between pages.

use std::sync::Arc;

use flatscan_core::error::{Result, ScanError};
use flatscan_core::{
    CornerIndex, Corners, FilterType, Orientation, PageId, Point, Rotation, jpeg_quality,
    validate_quality,
};
use image::DynamicImage;
use tracing::{debug, info, instrument};

use crate::engine::ImageEngine;
use crate::export::estimate::{PDF_DOCUMENT_OVERHEAD, page_bytes};
use crate::export::{
    CancelFlag, EncodedPage, ExportPage, ExportProgress, PdfBuilder, PdfMetadata, ZipBuilder,
    encode_page,
};
use crate::filter::{CacheStats, FilterCache, FilterMode, FilteredImage};
use crate::geometry::{self, clamp_point};
use crate::raster;

/// One scanned page.
#[derive(Debug, Clone)]
pub struct Page {
    id: PageId,
    source: Arc<DynamicImage>,
    corners: Corners,
    detected: bool,
    cropped: Option<Arc<DynamicImage>>,
    filter: FilterType,
    rotation: Rotation,
    orientation: Orientation,
}

impl Page {
    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn source(&self) -> &DynamicImage {
        &self.source
    }

    pub fn corners(&self) -> Corners {
        self.corners
    }

    /// Whether the corners came from detection rather than the default inset.
    pub fn was_detected(&self) -> bool {
        self.detected
    }

    pub fn cropped(&self) -> Option<&DynamicImage> {
        self.cropped.as_deref()
    }

    pub fn filter(&self) -> FilterType {
        self.filter
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// The raster filters run on: the crop once there is one, else the source.
    fn working_image(&self) -> &DynamicImage {
        self.cropped.as_deref().unwrap_or(&self.source)
    }
}

/// A scanning session over an [`ImageEngine`].
pub struct ScanSession {
    engine: Arc<ImageEngine>,
    pages: Vec<Page>,
    cache: FilterCache,
}

impl ScanSession {
    pub fn new(engine: Arc<ImageEngine>) -> Self {
        Self {
            engine,
            pages: Vec::new(),
            cache: FilterCache::new(),
        }
    }

    pub fn engine(&self) -> &ImageEngine {
        &self.engine
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, id: PageId) -> Option<&Page> {
        self.pages.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    fn index_of(&self, id: PageId) -> Result<usize> {
        self.pages
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| ScanError::PageNotFound(id.to_string()))
    }

    fn page_mut(&mut self, id: PageId) -> Result<&mut Page> {
        let index = self.index_of(id)?;
        Ok(&mut self.pages[index])
    }

    // -- Page list --------------------------------------------------------

    /// Append a page, seeding its corners from edge detection.
    #[instrument(skip(self, source), fields(width = source.width(), height = source.height()))]
    pub fn add_page(&mut self, source: DynamicImage) -> PageId {
        let detection = self.engine.detector().detect_or_default(&source);
        let page = Page {
            id: PageId::new(),
            source: Arc::new(source),
            corners: detection.corners(),
            detected: detection.is_found(),
            cropped: None,
            filter: FilterType::default(),
            rotation: Rotation::None,
            orientation: self.engine.exporter().settings().orientation,
        };
        let id = page.id;
        info!(%id, detected = page.detected, pages = self.pages.len() + 1, "Page added");
        self.pages.push(page);
        id
    }

    /// Decode JPEG, PNG, or WebP bytes and append the result.
    pub fn add_page_bytes(&mut self, data: &[u8]) -> Result<PageId> {
        let image = raster::decode_image(data)?;
        Ok(self.add_page(image))
    }

    /// Remove a page and release its cached results.
    pub fn remove_page(&mut self, id: PageId) -> Result<()> {
        let index = self.index_of(id)?;
        self.pages.remove(index);
        let released = self.cache.invalidate(id);
        info!(%id, released, "Page removed");
        Ok(())
    }

    /// Move a page to `new_index`, clamped to the end of the list.
    pub fn move_page(&mut self, id: PageId, new_index: usize) -> Result<()> {
        let index = self.index_of(id)?;
        let page = self.pages.remove(index);
        let target = new_index.min(self.pages.len());
        self.pages.insert(target, page);
        debug!(%id, from = index, to = target, "Page moved");
        Ok(())
    }

    /// Drop every page and cached result.
    pub fn reset(&mut self) {
        self.pages.clear();
        let released = self.cache.invalidate_all();
        info!(released, "Session reset");
    }

    // -- Corners and cropping ----------------------------------------------

    /// Move one corner, clamped to the source bounds. Returns the new corners.
    pub fn set_corner(&mut self, id: PageId, index: CornerIndex, point: Point) -> Result<Corners> {
        let page = self.page_mut(id)?;
        let clamped = clamp_point(point, page.source.width(), page.source.height());
        page.corners = page.corners.with(index, clamped);
        Ok(page.corners)
    }

    /// Replace all four corners, each clamped to the source bounds.
    pub fn set_corners(&mut self, id: PageId, corners: Corners) -> Result<Corners> {
        let page = self.page_mut(id)?;
        let (w, h) = (page.source.width(), page.source.height());
        let [tl, tr, br, bl] = corners.to_array().map(|p| clamp_point(p, w, h));
        page.corners = Corners::new(tl, tr, br, bl);
        Ok(page.corners)
    }

    /// Restore the default inset corners.
    pub fn reset_corners(&mut self, id: PageId) -> Result<Corners> {
        let page = self.page_mut(id)?;
        page.corners = geometry::default_corners(page.source.width(), page.source.height(), None);
        page.detected = false;
        Ok(page.corners)
    }

    /// Rectify the page to its current corners, replacing any earlier crop.
    #[instrument(skip(self))]
    pub fn crop_page(&mut self, id: PageId) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        let page = self.page_mut(id)?;
        let rectified = engine.rectifier().rectify(&page.source, &page.corners)?;
        debug!(
            %id,
            width = rectified.width(),
            height = rectified.height(),
            "Page cropped"
        );
        page.cropped = Some(Arc::new(rectified));
        self.cache.invalidate(id);
        Ok(())
    }

    // -- Per-page settings ---------------------------------------------------

    pub fn set_filter(&mut self, id: PageId, filter: FilterType) -> Result<()> {
        self.page_mut(id)?.filter = filter;
        Ok(())
    }

    /// Turn the page a further 90° clockwise.
    pub fn rotate_page(&mut self, id: PageId) -> Result<Rotation> {
        let page = self.page_mut(id)?;
        page.rotation = page.rotation.rotate_cw();
        Ok(page.rotation)
    }

    pub fn set_rotation(&mut self, id: PageId, rotation: Rotation) -> Result<()> {
        self.page_mut(id)?.rotation = rotation;
        Ok(())
    }

    pub fn set_orientation(&mut self, id: PageId, orientation: Orientation) -> Result<()> {
        self.page_mut(id)?.orientation = orientation;
        Ok(())
    }

    // -- Filtering -----------------------------------------------------------

    /// Downscaled preview of `filter` on the page, served from the cache when
    /// possible.
    pub fn preview(&mut self, id: PageId, filter: FilterType) -> Result<Arc<FilteredImage>> {
        let index = self.index_of(id)?;
        if let Some(hit) = self.cache.get(id, filter) {
            return Ok(hit);
        }
        let handle = self.engine.filters().apply(
            self.pages[index].working_image(),
            filter,
            FilterMode::Preview,
        );
        self.cache.put(id, filter, Arc::clone(&handle));
        Ok(handle)
    }

    /// Preview of the page's selected filter.
    pub fn preview_selected(&mut self, id: PageId) -> Result<Arc<FilteredImage>> {
        let filter = self.page(id).map(Page::filter).unwrap_or_default();
        self.preview(id, filter)
    }

    /// Select `filter` on every page and warm its preview, in page order.
    pub async fn apply_filter_to_all(
        &mut self,
        filter: FilterType,
        mut progress: impl FnMut(ExportProgress),
        cancel: &CancelFlag,
    ) -> Result<()> {
        let total = self.pages.len();
        info!(?filter, pages = total, "Applying filter to all pages");
        for index in 0..total {
            cancel.check()?;
            let id = self.pages[index].id;
            self.pages[index].filter = filter;
            self.preview(id, filter)?;
            progress(ExportProgress {
                completed: index + 1,
                total,
            });
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    // -- Export --------------------------------------------------------------

    /// The page at full resolution, filtered for export. Pages that were never
    /// cropped are rectified to their current corners first. Never cached.
    fn export_page(&self, page: &Page) -> Result<ExportPage> {
        let raster = match &page.cropped {
            Some(cropped) => Arc::clone(cropped),
            None => {
                debug!(id = %page.id, "Rectifying uncropped page for export");
                Arc::new(self.engine.rectifier().rectify(&page.source, &page.corners)?)
            }
        };
        Ok(ExportPage {
            image: self
                .engine
                .filters()
                .apply(&raster, page.filter, FilterMode::Export),
            rotation: page.rotation,
            orientation: page.orientation,
        })
    }

    /// Filter and encode one page. The full-resolution raster is dropped
    /// before this returns; only the JPEG survives.
    fn encode(&self, page: &Page, quality: u8) -> Result<EncodedPage> {
        let export = self.export_page(page)?;
        encode_page(&export.image, export.rotation, quality)
    }

    fn ensure_pages(&self) -> Result<()> {
        if self.pages.is_empty() {
            return Err(ScanError::NothingToExport);
        }
        Ok(())
    }

    /// Every page as one PDF.
    #[instrument(skip_all, fields(pages = self.pages.len()))]
    pub async fn export_pdf(
        &self,
        metadata: &PdfMetadata,
        mut progress: impl FnMut(ExportProgress),
        cancel: &CancelFlag,
    ) -> Result<Vec<u8>> {
        self.ensure_pages()?;
        let settings = *self.engine.exporter().settings();
        let quality = settings.jpeg_quality();
        let total = self.pages.len();
        info!(paper = ?settings.paper_size, "Exporting PDF");

        let mut builder = PdfBuilder::new(settings, metadata.clone());
        for (index, page) in self.pages.iter().enumerate() {
            cancel.check()?;
            builder.push(self.encode(page, quality)?, page.orientation)?;
            progress(ExportProgress {
                completed: index + 1,
                total,
            });
            tokio::task::yield_now().await;
        }
        builder.finish()
    }

    /// A single page as a JPEG.
    pub async fn export_jpg(&self, id: PageId) -> Result<Vec<u8>> {
        let page = self
            .page(id)
            .ok_or_else(|| ScanError::PageNotFound(id.to_string()))?;
        let export = self.export_page(page)?;
        tokio::task::yield_now().await;
        self.engine.exporter().export_jpg(&export)
    }

    /// Every page as a JPEG inside a ZIP.
    #[instrument(skip_all, fields(pages = self.pages.len()))]
    pub async fn export_zip(
        &self,
        mut progress: impl FnMut(ExportProgress),
        cancel: &CancelFlag,
    ) -> Result<Vec<u8>> {
        self.ensure_pages()?;
        let quality = self.engine.exporter().settings().jpeg_quality();
        let total = self.pages.len();
        info!("Exporting ZIP");

        let mut builder = ZipBuilder::new(total);
        for (index, page) in self.pages.iter().enumerate() {
            cancel.check()?;
            builder.push(&self.encode(page, quality)?)?;
            progress(ExportProgress {
                completed: index + 1,
                total,
            });
            tokio::task::yield_now().await;
        }
        builder.finish()
    }

    /// Predicted PDF size at `quality` (0–1), measured by encoding each page.
    pub async fn estimate_pdf_size(&self, quality: f32) -> Result<u64> {
        validate_quality(quality)?;
        let quality = jpeg_quality(quality);
        let mut total = PDF_DOCUMENT_OVERHEAD;
        for page in &self.pages {
            total += page_bytes(&self.encode(page, quality)?);
            tokio::task::yield_now().await;
        }
        debug!(pages = self.pages.len(), bytes = total, "Estimated PDF size");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatscan_core::ScanConfig;
    use image::{Rgba, RgbaImage};

    fn session() -> ScanSession {
        ScanSession::new(Arc::new(ImageEngine::new(ScanConfig::default()).unwrap()))
    }

    fn photo(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        }))
    }

    #[test]
    fn featureless_photo_gets_default_corners() {
        let mut s = session();
        let id = s.add_page(photo(200, 100));
        let page = s.page(id).unwrap();
        assert!(!page.was_detected());
        assert_eq!(page.corners(), geometry::default_corners(200, 100, None));
        assert_eq!(page.filter(), FilterType::Enhanced);
        assert_eq!(page.rotation(), Rotation::None);
    }

    #[test]
    fn corners_are_clamped_to_source() {
        let mut s = session();
        let id = s.add_page(photo(200, 100));
        let corners = s
            .set_corner(id, CornerIndex::BottomRight, Point::new(500.0, -3.0))
            .unwrap();
        assert_eq!(corners.bottom_right, Point::new(200.0, 0.0));
    }

    #[test]
    fn cache_miss_hit_invalidate_miss() {
        let mut s = session();
        let id = s.add_page(photo(64, 48));

        let first = s.preview(id, FilterType::Grayscale).unwrap();
        assert_eq!(s.cache_stats(), CacheStats { hits: 0, misses: 1 });

        let second = s.preview(id, FilterType::Grayscale).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(s.cache_stats(), CacheStats { hits: 1, misses: 1 });

        s.crop_page(id).unwrap();
        assert_eq!(s.cached_entries(), 0);

        let third = s.preview(id, FilterType::Grayscale).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(s.cache_stats().misses, 2);
    }

    #[test]
    fn crop_uses_current_corners() {
        let mut s = session();
        let id = s.add_page(photo(200, 100));
        s.set_corner(id, CornerIndex::TopLeft, Point::new(0.0, 0.0)).unwrap();
        s.set_corner(id, CornerIndex::TopRight, Point::new(120.0, 0.0)).unwrap();
        s.set_corner(id, CornerIndex::BottomRight, Point::new(120.0, 60.0)).unwrap();
        s.set_corner(id, CornerIndex::BottomLeft, Point::new(0.0, 60.0)).unwrap();
        s.crop_page(id).unwrap();

        let cropped = s.page(id).unwrap().cropped().unwrap();
        assert_eq!((cropped.width(), cropped.height()), (120, 60));
    }

    #[test]
    fn removing_and_resetting_release_cache_entries() {
        let mut s = session();
        let a = s.add_page(photo(32, 32));
        let b = s.add_page(photo(32, 32));
        s.preview(a, FilterType::Bw).unwrap();
        s.preview(a, FilterType::Shadow).unwrap();
        s.preview(b, FilterType::Bw).unwrap();

        s.remove_page(a).unwrap();
        assert_eq!(s.cached_entries(), 1);
        assert!(matches!(s.remove_page(a), Err(ScanError::PageNotFound(_))));

        s.reset();
        assert!(s.is_empty());
        assert_eq!(s.cached_entries(), 0);
    }

    #[test]
    fn move_page_reorders() {
        let mut s = session();
        let a = s.add_page(photo(8, 8));
        let b = s.add_page(photo(8, 8));
        let c = s.add_page(photo(8, 8));
        s.move_page(c, 0).unwrap();
        let order: Vec<PageId> = s.pages().iter().map(Page::id).collect();
        assert_eq!(order, vec![c, a, b]);
        s.move_page(c, 99).unwrap();
        assert_eq!(s.pages().last().unwrap().id(), c);
    }

    #[test]
    fn rotation_cycles_clockwise() {
        let mut s = session();
        let id = s.add_page(photo(8, 8));
        assert_eq!(s.rotate_page(id).unwrap(), Rotation::Cw90);
        assert_eq!(s.rotate_page(id).unwrap(), Rotation::Cw180);
        assert_eq!(s.rotate_page(id).unwrap(), Rotation::Cw270);
        assert_eq!(s.rotate_page(id).unwrap(), Rotation::None);
    }

    #[tokio::test]
    async fn apply_to_all_reports_ordered_progress() {
        let mut s = session();
        for _ in 0..3 {
            s.add_page(photo(16, 16));
        }
        let mut seen = Vec::new();
        s.apply_filter_to_all(FilterType::Bw, |p| seen.push(p.completed), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(seen, vec![1, 2, 3]);
        assert!(s.pages().iter().all(|p| p.filter() == FilterType::Bw));
        assert_eq!(s.cached_entries(), 3);
    }

    #[tokio::test]
    async fn empty_session_has_nothing_to_export() {
        let s = session();
        assert!(matches!(
            s.export_pdf(&PdfMetadata::default(), |_| {}, &CancelFlag::new()).await,
            Err(ScanError::NothingToExport)
        ));
        assert!(matches!(
            s.export_zip(|_| {}, &CancelFlag::new()).await,
            Err(ScanError::NothingToExport)
        ));
    }

    #[tokio::test]
    async fn cancelled_export_is_reported() {
        let mut s = session();
        s.add_page(photo(16, 16));
        let cancel = CancelFlag::new();
        cancel.cancel();
        assert!(matches!(
            s.export_pdf(&PdfMetadata::default(), |_| {}, &cancel).await,
            Err(ScanError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn export_uses_full_resolution() {
        let mut s = session();
        let id = s.add_page(photo(1600, 400));
        s.set_corners(id, geometry::default_corners(1600, 400, Some(0.0))).unwrap();
        s.set_filter(id, FilterType::Original).unwrap();

        // Preview is capped at 1200 on the long side; export is not.
        let preview = s.preview_selected(id).unwrap();
        assert_eq!(preview.width(), 1200);

        let jpeg = s.export_jpg(id).await.unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1600, 400));
    }

    #[tokio::test]
    async fn uncropped_page_exports_its_detected_document() {
        let mut s = session();
        let desk = DynamicImage::ImageRgba8(RgbaImage::from_fn(400, 400, |x, y| {
            if (100..300).contains(&x) && (100..300).contains(&y) {
                Rgba([240, 240, 240, 255])
            } else {
                Rgba([30, 30, 30, 255])
            }
        }));
        let id = s.add_page(desk);
        assert!(s.page(id).unwrap().was_detected());
        assert!(s.page(id).unwrap().cropped().is_none());

        let jpeg = s.export_jpg(id).await.unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert!(decoded.width().abs_diff(200) <= 3, "width {}", decoded.width());
        assert!(decoded.height().abs_diff(200) <= 3, "height {}", decoded.height());
    }

    #[tokio::test]
    async fn uncropped_page_follows_user_corners() {
        let mut s = session();
        let id = s.add_page(photo(300, 200));
        s.set_corners(
            id,
            Corners::new(
                Point::new(10.0, 20.0),
                Point::new(130.0, 20.0),
                Point::new(130.0, 100.0),
                Point::new(10.0, 100.0),
            ),
        )
        .unwrap();

        let jpeg = s.export_jpg(id).await.unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (120, 80));
        assert!(s.page(id).unwrap().cropped().is_none());
    }

    #[tokio::test]
    async fn export_yields_between_encoded_pages() {
        use std::cell::Cell;

        let mut s = session();
        for _ in 0..3 {
            s.add_page(photo(64, 64));
        }
        let ticks = Cell::new(0u32);
        let done = Cell::new(false);
        let mut seen = Vec::new();

        let export = async {
            let result = s
                .export_pdf(
                    &PdfMetadata::default(),
                    |p| seen.push((p.completed, ticks.get())),
                    &CancelFlag::new(),
                )
                .await;
            done.set(true);
            result
        };
        let ticker = async {
            while !done.get() {
                ticks.set(ticks.get() + 1);
                tokio::task::yield_now().await;
            }
        };
        let (result, ()) = tokio::join!(export, ticker);
        result.unwrap();

        // Progress arrives page by page with the runtime getting a turn in
        // between, not in one burst after all pages are filtered.
        assert_eq!(seen.iter().map(|p| p.0).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(seen.windows(2).all(|w| w[1].1 > w[0].1), "{seen:?}");
    }

    #[tokio::test]
    async fn cancel_from_progress_stops_after_current_page() {
        let mut s = session();
        for _ in 0..3 {
            s.add_page(photo(32, 32));
        }
        let cancel = CancelFlag::new();
        let mut seen = Vec::new();
        let result = s
            .export_zip(
                |p| {
                    seen.push(p.completed);
                    cancel.cancel();
                },
                &cancel,
            )
            .await;
        assert!(matches!(result, Err(ScanError::Cancelled)));
        assert_eq!(seen, vec![1]);
    }

    #[tokio::test]
    async fn estimate_rejects_out_of_range_quality() {
        let mut s = session();
        s.add_page(photo(16, 16));
        assert!(matches!(
            s.estimate_pdf_size(1.5).await,
            Err(ScanError::InvalidSetting(_))
        ));
    }
}
