// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Memoised filter results keyed by page and filter.

use std::collections::HashMap;
use std::sync::Arc;

use flatscan_core::{FilterType, PageId};
use tracing::debug;

use super::engine::FilteredImage;

/// Hit/miss counters for a [`FilterCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Cache of filtered previews.
///
/// Unbounded; the page count times the five filters bounds it in practice.
/// Rotation and orientation are not part of the key since they are only
/// applied at export. Removing an entry drops the cache's handle, which frees
/// the raster once no caller still displays it.
#[derive(Debug, Default)]
pub struct FilterCache {
    entries: HashMap<(PageId, FilterType), Arc<FilteredImage>>,
    stats: CacheStats,
}

impl FilterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, page: PageId, filter: FilterType) -> Option<Arc<FilteredImage>> {
        match self.entries.get(&(page, filter)) {
            Some(handle) => {
                self.stats.hits += 1;
                Some(Arc::clone(handle))
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Store a handle, replacing (and releasing) any previous one for the key.
    pub fn put(&mut self, page: PageId, filter: FilterType, handle: Arc<FilteredImage>) {
        if self.entries.insert((page, filter), handle).is_some() {
            debug!(%page, ?filter, "Replaced cached filter result");
        }
    }

    /// Drop every entry for `page`. Returns how many were released.
    pub fn invalidate(&mut self, page: PageId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(id, _), _| *id != page);
        let released = before - self.entries.len();
        debug!(%page, released, "Invalidated cached filter results");
        released
    }

    /// Drop everything. Returns how many entries were released.
    pub fn invalidate_all(&mut self) -> usize {
        let released = self.entries.len();
        self.entries.clear();
        debug!(released, "Cleared filter cache");
        released
    }

    pub fn contains(&self, page: PageId, filter: FilterType) -> bool {
        self.entries.contains_key(&(page, filter))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::engine::{FilterEngine, FilterMode};
    use image::{DynamicImage, RgbaImage};

    fn handle(filter: FilterType) -> Arc<FilteredImage> {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
        FilterEngine::default().apply(&img, filter, FilterMode::Preview)
    }

    #[test]
    fn hit_returns_same_handle() {
        let mut cache = FilterCache::new();
        let page = PageId::new();
        assert!(cache.get(page, FilterType::Enhanced).is_none());

        let h = handle(FilterType::Enhanced);
        cache.put(page, FilterType::Enhanced, Arc::clone(&h));
        let hit = cache.get(page, FilterType::Enhanced).unwrap();
        assert!(Arc::ptr_eq(&h, &hit));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn invalidate_releases_only_that_page() {
        let mut cache = FilterCache::new();
        let (a, b) = (PageId::new(), PageId::new());
        cache.put(a, FilterType::Bw, handle(FilterType::Bw));
        cache.put(a, FilterType::Shadow, handle(FilterType::Shadow));
        cache.put(b, FilterType::Bw, handle(FilterType::Bw));

        assert_eq!(cache.invalidate(a), 2);
        assert!(!cache.contains(a, FilterType::Bw));
        assert!(cache.contains(b, FilterType::Bw));
        assert_eq!(cache.invalidate_all(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidation_frees_the_raster() {
        let mut cache = FilterCache::new();
        let page = PageId::new();
        let h = handle(FilterType::Grayscale);
        let weak = Arc::downgrade(&h);
        cache.put(page, FilterType::Grayscale, h);

        cache.invalidate(page);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn put_replaces_existing_entry() {
        let mut cache = FilterCache::new();
        let page = PageId::new();
        let first = handle(FilterType::Original);
        let weak = Arc::downgrade(&first);
        cache.put(page, FilterType::Original, first);
        cache.put(page, FilterType::Original, handle(FilterType::Original));

        assert_eq!(cache.len(), 1);
        assert!(weak.upgrade().is_none());
    }
}
