// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration: detection thresholds, filter parameters, export
// settings, and engine limits.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};
use crate::types::ExportSettings;

/// Tunables for the document edge detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Gaussian kernel size in pixels (odd).
    pub blur_kernel: u32,
    /// Canny hysteresis thresholds.
    pub canny_low: f32,
    pub canny_high: f32,
    /// Minimum contour area as a fraction of the image area.
    pub min_area_ratio: f32,
    /// Polygon approximation tolerance as a fraction of the contour perimeter.
    pub approx_epsilon: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            blur_kernel: 5,
            canny_low: 50.0,
            canny_high: 150.0,
            min_area_ratio: 0.1,
            approx_epsilon: 0.02,
        }
    }
}

/// Per-filter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Luma threshold for the black-and-white filter.
    pub bw_threshold: u8,
    pub enhanced_contrast: f32,
    pub enhanced_brightness: f32,
    /// Box-blur radius used to estimate background illumination.
    pub shadow_blur_radius: u32,
    pub shadow_contrast: f32,
    pub shadow_brightness: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            bw_threshold: 128,
            enhanced_contrast: 1.3,
            enhanced_brightness: 20.0,
            shadow_blur_radius: 50,
            shadow_contrast: 1.5,
            shadow_brightness: 0.0,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub detection: DetectionConfig,
    pub filter: FilterConfig,
    pub export: ExportSettings,
    /// Longest side, in pixels, of the image used for preview filtering.
    pub preview_max_dimension: u32,
    /// Upper bound on image engine initialisation.
    pub engine_init_timeout_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            filter: FilterConfig::default(),
            export: ExportSettings::default(),
            preview_max_dimension: 1200,
            engine_init_timeout_ms: 10_000,
        }
    }
}

impl ScanConfig {
    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.export.validate()?;

        let d = &self.detection;
        if d.blur_kernel == 0 || d.blur_kernel % 2 == 0 {
            return Err(ScanError::InvalidSetting(format!(
                "blur kernel must be a positive odd size, got {}",
                d.blur_kernel
            )));
        }
        if d.canny_low < 0.0 || d.canny_high < d.canny_low {
            return Err(ScanError::InvalidSetting(format!(
                "canny thresholds must satisfy 0 <= low <= high, got {}/{}",
                d.canny_low, d.canny_high
            )));
        }
        if !(0.0..1.0).contains(&d.min_area_ratio) {
            return Err(ScanError::InvalidSetting(format!(
                "min_area_ratio must be within [0, 1), got {}",
                d.min_area_ratio
            )));
        }
        if d.approx_epsilon <= 0.0 {
            return Err(ScanError::InvalidSetting(
                "approx_epsilon must be positive".into(),
            ));
        }
        if self.preview_max_dimension == 0 {
            return Err(ScanError::InvalidSetting(
                "preview_max_dimension must be positive".into(),
            ));
        }
        Ok(())
    }
}
