// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective rectification — warp a document quadrilateral onto an upright
// rectangle.

use flatscan_core::Corners;
use flatscan_core::error::{Result, ScanError};
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use tracing::{debug, info, instrument, warn};

use crate::geometry::{bounding_box, calculate_output_size, quad_area};

/// How the quadrilateral is mapped onto the output rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RectifyStrategy {
    /// Homography warp with bilinear resampling. Corrects keystoning.
    #[default]
    Exact,
    /// Bounding-box crop scaled to the output size. Lower geometric
    /// fidelity: skew and keystoning are left in place.
    BoundingBox,
}

/// Quadrilateral areas below this are treated as degenerate.
const MIN_QUAD_AREA: f32 = 1.0;

/// Largest rectified page, in pixels (400 MB of RGBA).
pub const MAX_OUTPUT_PIXELS: u64 = 100_000_000;

/// Maps a corner set onto a flat page raster.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rectifier {
    strategy: RectifyStrategy,
}

impl Rectifier {
    pub fn new(strategy: RectifyStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> RectifyStrategy {
        self.strategy
    }

    /// Produce the rectified page at `calculate_output_size(corners)`.
    ///
    /// The result is a fresh RGBA raster; samples that fall outside the source
    /// are white. A degenerate quadrilateral (no invertible homography) drops
    /// to the bounding-box crop rather than failing.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn rectify(&self, image: &DynamicImage, corners: &Corners) -> Result<DynamicImage> {
        let (out_w, out_h) = calculate_output_size(corners);
        check_budget(out_w, out_h)?;
        info!(out_w, out_h, strategy = ?self.strategy, "Rectifying page");

        match self.strategy {
            RectifyStrategy::Exact => {
                if quad_area(corners) >= MIN_QUAD_AREA {
                    if let Some(warped) = warp(image, corners, out_w, out_h)? {
                        return Ok(warped);
                    }
                }
                warn!(
                    ?corners,
                    "Degenerate quadrilateral; using bounding-box crop without keystone correction"
                );
                crop_bounding_box(image, corners, out_w, out_h)
            }
            RectifyStrategy::BoundingBox => {
                warn!("Bounding-box crop selected; keystoning is not corrected");
                crop_bounding_box(image, corners, out_w, out_h)
            }
        }
    }
}

/// Homography warp. Returns `Ok(None)` when the projection is not invertible.
fn warp(
    image: &DynamicImage,
    corners: &Corners,
    out_w: u32,
    out_h: u32,
) -> Result<Option<DynamicImage>> {
    let dest: [(f32, f32); 4] = [
        (0.0, 0.0),
        (out_w as f32, 0.0),
        (out_w as f32, out_h as f32),
        (0.0, out_h as f32),
    ];

    let Some(projection) = Projection::from_control_points(corners.to_tuples(), dest) else {
        return Ok(None);
    };

    let source = image.to_rgba8();
    let mut output = allocate(out_w, out_h)?;
    warp_into(
        &source,
        &projection,
        Interpolation::Bilinear,
        Rgba([255u8, 255, 255, 255]),
        &mut output,
    );

    debug!(out_w, out_h, "Homography warp applied");
    Ok(Some(DynamicImage::ImageRgba8(output)))
}

/// Crop the axis-aligned bounding box of the corners and scale it to size.
fn crop_bounding_box(
    image: &DynamicImage,
    corners: &Corners,
    out_w: u32,
    out_h: u32,
) -> Result<DynamicImage> {
    let (img_w, img_h) = (image.width(), image.height());
    let (x0, y0, x1, y1) = bounding_box(corners);

    let x = (x0.max(0.0).floor() as u32).min(img_w.saturating_sub(1));
    let y = (y0.max(0.0).floor() as u32).min(img_h.saturating_sub(1));
    let right = (x1.ceil().max(0.0) as u32).clamp(x + 1, img_w.max(x + 1));
    let bottom = (y1.ceil().max(0.0) as u32).clamp(y + 1, img_h.max(y + 1));

    let cropped = image.crop_imm(x, y, right - x, bottom - y);
    let scaled = cropped.resize_exact(out_w, out_h, FilterType::Triangle);
    debug!(x, y, w = right - x, h = bottom - y, "Bounding-box crop applied");
    Ok(DynamicImage::ImageRgba8(scaled.to_rgba8()))
}

/// Refuse output sizes above [`MAX_OUTPUT_PIXELS`].
fn check_budget(width: u32, height: u32) -> Result<()> {
    let pixels = width as u64 * height as u64;
    if pixels > MAX_OUTPUT_PIXELS {
        return Err(ScanError::ResourceAllocation(format!(
            "{}x{} raster exceeds the {} pixel limit",
            width, height, MAX_OUTPUT_PIXELS
        )));
    }
    Ok(())
}

fn allocate(width: u32, height: u32) -> Result<RgbaImage> {
    check_budget(width, height)?;
    Ok(RgbaImage::new(width, height))
}
