// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan filters — pass-through, grayscale, black-and-white threshold,
// contrast/brightness enhancement, and shadow removal by background
// illumination normalisation.

use std::sync::Arc;

use flatscan_core::error::Result;
use flatscan_core::{FilterConfig, FilterType};
use image::{DynamicImage, RgbaImage};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::raster;

/// Resolution a filter runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    /// Downscaled copy for interactive selection. Never exported.
    Preview,
    /// Full resolution of the rectified page.
    Export,
}

/// A filtered raster. Shared behind an `Arc`; dropping the last handle frees
/// the pixel buffer.
#[derive(Debug)]
pub struct FilteredImage {
    image: DynamicImage,
    filter: FilterType,
    mode: FilterMode,
}

impl FilteredImage {
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn filter(&self) -> FilterType {
        self.filter
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_export_grade(&self) -> bool {
        self.mode == FilterMode::Export
    }

    /// SHA-256 over the dimensions and pixel buffer, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.image.width().to_le_bytes());
        hasher.update(self.image.height().to_le_bytes());
        hasher.update(self.image.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Lossless encoding of the filtered raster.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        raster::to_png_bytes(&self.image)
    }
}

/// Applies scan filters to rectified pages.
#[derive(Debug, Clone, Copy)]
pub struct FilterEngine {
    config: FilterConfig,
    preview_max_dimension: u32,
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::new(FilterConfig::default(), 1200)
    }
}

impl FilterEngine {
    pub fn new(config: FilterConfig, preview_max_dimension: u32) -> Self {
        Self {
            config,
            preview_max_dimension,
        }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Apply `filter` to `source`.
    ///
    /// The filter always works on its own RGBA copy; the source is never
    /// touched. In [`FilterMode::Preview`] the copy is first downscaled so its
    /// longer side is at most the preview dimension.
    #[instrument(skip(self, source), fields(width = source.width(), height = source.height()))]
    pub fn apply(
        &self,
        source: &DynamicImage,
        filter: FilterType,
        mode: FilterMode,
    ) -> Arc<FilteredImage> {
        let mut working = match mode {
            FilterMode::Preview => {
                raster::downscale_to_fit(source, self.preview_max_dimension).to_rgba8()
            }
            FilterMode::Export => source.to_rgba8(),
        };
        info!(
            ?filter,
            ?mode,
            w = working.width(),
            h = working.height(),
            "Applying filter"
        );

        let c = &self.config;
        match filter {
            FilterType::Original => {}
            FilterType::Grayscale => grayscale(&mut working),
            FilterType::Bw => threshold(&mut working, c.bw_threshold),
            FilterType::Enhanced => {
                contrast_brightness(&mut working, c.enhanced_contrast, c.enhanced_brightness)
            }
            FilterType::Shadow => remove_shadows(
                &mut working,
                c.shadow_blur_radius,
                c.shadow_contrast,
                c.shadow_brightness,
            ),
        }

        Arc::new(FilteredImage {
            image: DynamicImage::ImageRgba8(working),
            filter,
            mode,
        })
    }
}

// -- Pixel transforms ---------------------------------------------------------

/// BT.601 luma, rounded.
fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// `(c - 128) * contrast + 128 + brightness`, clamped to a byte.
fn contrast_channel(c: f32, contrast: f32, brightness: f32) -> u8 {
    ((c - 128.0) * contrast + 128.0 + brightness)
        .round()
        .clamp(0.0, 255.0) as u8
}

fn grayscale(img: &mut RgbaImage) {
    for px in img.pixels_mut() {
        let [r, g, b, _] = px.0;
        let y = luma(r, g, b);
        px.0[..3].fill(y);
    }
}

/// Pixels with luma at or below `threshold` become black, the rest white.
fn threshold(img: &mut RgbaImage, threshold: u8) {
    for px in img.pixels_mut() {
        let [r, g, b, _] = px.0;
        let v = if luma(r, g, b) <= threshold { 0 } else { 255 };
        px.0[..3].fill(v);
    }
}

fn contrast_brightness(img: &mut RgbaImage, contrast: f32, brightness: f32) {
    for px in img.pixels_mut() {
        for channel in &mut px.0[..3] {
            *channel = contrast_channel(*channel as f32, contrast, brightness);
        }
    }
}

/// Divide out a low-pass estimate of the lighting, then restore contrast.
///
/// The background is a box blur of the luma map with radius capped at a
/// quarter of the shorter side.
fn remove_shadows(img: &mut RgbaImage, radius: u32, contrast: f32, brightness: f32) {
    let (w, h) = (img.width() as usize, img.height() as usize);
    if w == 0 || h == 0 {
        return;
    }
    let radius = radius.min((w.min(h) / 4) as u32) as usize;

    let luma_map: Vec<f32> = img
        .pixels()
        .map(|px| luma(px.0[0], px.0[1], px.0[2]) as f32)
        .collect();
    let background = box_blur(&luma_map, w, h, radius);
    debug!(radius, "Background illumination estimated");

    for (px, &bg) in img.pixels_mut().zip(background.iter()) {
        let bg = bg.max(1.0);
        for channel in &mut px.0[..3] {
            let normalized = (*channel as f32 / bg) * 255.0;
            *channel = contrast_channel(normalized, contrast, brightness);
        }
    }
}

/// Separable mean filter over a `(2r+1)^2` window, clipped at the borders.
///
/// Each pass uses prefix sums, so the cost is independent of the radius.
fn box_blur(data: &[f32], w: usize, h: usize, radius: usize) -> Vec<f32> {
    if radius == 0 {
        return data.to_vec();
    }

    let mut horizontal = vec![0.0f32; data.len()];
    let mut prefix = vec![0.0f64; w.max(h) + 1];

    for y in 0..h {
        let row = &data[y * w..(y + 1) * w];
        for (x, &v) in row.iter().enumerate() {
            prefix[x + 1] = prefix[x] + v as f64;
        }
        for x in 0..w {
            let lo = x.saturating_sub(radius);
            let hi = (x + radius).min(w - 1);
            horizontal[y * w + x] = ((prefix[hi + 1] - prefix[lo]) / (hi - lo + 1) as f64) as f32;
        }
    }

    let mut out = vec![0.0f32; data.len()];
    for x in 0..w {
        for y in 0..h {
            prefix[y + 1] = prefix[y] + horizontal[y * w + x] as f64;
        }
        for y in 0..h {
            let lo = y.saturating_sub(radius);
            let hi = (y + radius).min(h - 1);
            out[y * w + x] = ((prefix[hi + 1] - prefix[lo]) / (hi - lo + 1) as f64) as f32;
        }
    }
    out
}
