// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Flatscan scanning pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ScanError};

/// Unique identifier for a scanned page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub Uuid);

impl PageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point in image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

impl From<Point> for (f32, f32) {
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

/// Which of the four document corners a point represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CornerIndex {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

/// The four corners of a document quadrilateral, in canonical order.
///
/// Order is fixed as top-left, top-right, bottom-right, bottom-left (clockwise
/// from the origin). The quadrilateral should be simple; convexity is not
/// checked, and near-zero area only degrades rectification quality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corners {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
}

impl Corners {
    pub const fn new(
        top_left: Point,
        top_right: Point,
        bottom_right: Point,
        bottom_left: Point,
    ) -> Self {
        Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        }
    }

    /// Corners in canonical order as an array.
    pub fn to_array(&self) -> [Point; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    /// Corners as `(x, y)` tuples, the shape `imageproc` control points take.
    pub fn to_tuples(&self) -> [(f32, f32); 4] {
        self.to_array().map(Into::into)
    }

    pub fn get(&self, index: CornerIndex) -> Point {
        match index {
            CornerIndex::TopLeft => self.top_left,
            CornerIndex::TopRight => self.top_right,
            CornerIndex::BottomRight => self.bottom_right,
            CornerIndex::BottomLeft => self.bottom_left,
        }
    }

    /// Return a copy with a single corner replaced.
    pub fn with(mut self, index: CornerIndex, point: Point) -> Self {
        match index {
            CornerIndex::TopLeft => self.top_left = point,
            CornerIndex::TopRight => self.top_right = point,
            CornerIndex::BottomRight => self.bottom_right = point,
            CornerIndex::BottomLeft => self.bottom_left = point,
        }
        self
    }
}

/// Scan filter applied to a rectified page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    /// Pixel pass-through.
    Original,
    /// BT.601 luma replicated to all channels.
    Grayscale,
    /// Hard global threshold on luma.
    Bw,
    /// Per-channel contrast and brightness boost.
    #[default]
    Enhanced,
    /// Background-illumination normalisation followed by a contrast boost.
    Shadow,
}

impl FilterType {
    pub const ALL: [FilterType; 5] = [
        Self::Original,
        Self::Grayscale,
        Self::Bw,
        Self::Enhanced,
        Self::Shadow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Grayscale => "grayscale",
            Self::Bw => "bw",
            Self::Enhanced => "enhanced",
            Self::Shadow => "shadow",
        }
    }
}

impl std::str::FromStr for FilterType {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "original" => Ok(Self::Original),
            "grayscale" | "greyscale" => Ok(Self::Grayscale),
            "bw" => Ok(Self::Bw),
            "enhanced" => Ok(Self::Enhanced),
            "shadow" => Ok(Self::Shadow),
            other => Err(ScanError::InvalidSetting(format!("unknown filter: {other}"))),
        }
    }
}

/// Clockwise page rotation applied at export time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    pub fn degrees(&self) -> u16 {
        match self {
            Self::None => 0,
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }

    /// Parse a clockwise angle; only multiples of 90 are accepted.
    pub fn from_degrees(degrees: i32) -> Result<Self> {
        match degrees.rem_euclid(360) {
            0 => Ok(Self::None),
            90 => Ok(Self::Cw90),
            180 => Ok(Self::Cw180),
            270 => Ok(Self::Cw270),
            _ => Err(ScanError::InvalidSetting(format!(
                "rotation must be a multiple of 90 degrees, got {degrees}"
            ))),
        }
    }

    /// The next rotation step, 90 degrees further clockwise.
    pub fn rotate_cw(self) -> Self {
        match self {
            Self::None => Self::Cw90,
            Self::Cw90 => Self::Cw180,
            Self::Cw180 => Self::Cw270,
            Self::Cw270 => Self::None,
        }
    }

    /// Whether this rotation exchanges width and height.
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Self::Cw90 | Self::Cw270)
    }
}

/// Page orientation for export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Export paper sizes. Dimensions are in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperSize {
    #[default]
    A4,
    A5,
    Letter,
    Legal,
    B5,
}

impl PaperSize {
    /// Portrait dimensions in points (width, height).
    pub fn dimensions_pt(&self) -> (f32, f32) {
        match self {
            Self::A4 => (595.28, 841.89),
            Self::A5 => (419.53, 595.28),
            Self::Letter => (612.0, 792.0),
            Self::Legal => (612.0, 1008.0),
            Self::B5 => (498.9, 708.66),
        }
    }

    /// Page box for the given orientation; landscape swaps width and height.
    pub fn page_box(&self, orientation: Orientation) -> (f32, f32) {
        let (w, h) = self.dimensions_pt();
        match orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        }
    }
}

/// Settings consumed by the export engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub paper_size: PaperSize,
    /// Base orientation for pages that do not override it.
    pub orientation: Orientation,
    /// JPEG quality in [0, 1]; the settings layer offers 0.5–1.0.
    pub quality: f32,
    /// Margin on every side of the page, in points.
    pub margin: f32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            paper_size: PaperSize::A4,
            orientation: Orientation::Portrait,
            quality: 0.92,
            margin: 0.0,
        }
    }
}

impl ExportSettings {
    pub fn validate(&self) -> Result<()> {
        validate_quality(self.quality)?;
        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err(ScanError::InvalidSetting(format!(
                "margin must be a non-negative number of points, got {}",
                self.margin
            )));
        }
        let (w, h) = self.paper_size.dimensions_pt();
        if self.margin * 2.0 >= w.min(h) {
            return Err(ScanError::InvalidSetting(format!(
                "margin {} leaves no printable area on {:?}",
                self.margin, self.paper_size
            )));
        }
        Ok(())
    }

    /// Quality mapped onto the 1–100 scale JPEG encoders take.
    pub fn jpeg_quality(&self) -> u8 {
        jpeg_quality(self.quality)
    }
}

/// Reject qualities outside [0, 1].
pub fn validate_quality(quality: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&quality) {
        return Err(ScanError::InvalidSetting(format!(
            "quality must be within [0, 1], got {quality}"
        )));
    }
    Ok(())
}

/// Map a [0, 1] quality onto the 1–100 JPEG scale.
pub fn jpeg_quality(quality: f32) -> u8 {
    (quality.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8
}
