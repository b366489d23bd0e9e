// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster helpers — decoding with a size cap, quarter-turn rotation, white
// background compositing, downscaling, and PNG/JPEG encoding.

use flatscan_core::Rotation;
use flatscan_core::error::{Result, ScanError};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tracing::{debug, instrument};

/// Largest encoded source accepted by [`decode_image`] (20 MiB).
pub const MAX_SOURCE_BYTES: usize = 20 * 1024 * 1024;

/// Decode JPEG, PNG, or WebP bytes into a raster.
#[instrument(skip(data), fields(data_len = data.len()))]
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    if data.len() > MAX_SOURCE_BYTES {
        return Err(ScanError::SourceTooLarge {
            size: data.len(),
            limit: MAX_SOURCE_BYTES,
        });
    }
    let format = image::guess_format(data)
        .map_err(|err| ScanError::Decode(format!("unrecognised image format: {}", err)))?;
    if !matches!(
        format,
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP
    ) {
        return Err(ScanError::Decode(format!(
            "unsupported image format: {:?}",
            format
        )));
    }
    let img = image::load_from_memory_with_format(data, format)
        .map_err(|err| ScanError::Decode(format!("failed to decode image: {}", err)))?;
    debug!(
        width = img.width(),
        height = img.height(),
        ?format,
        "Image decoded from bytes"
    );
    Ok(img)
}

/// Rotate clockwise by a quarter-turn multiple. 90 and 270 swap dimensions.
pub fn rotate(image: &DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::None => image.clone(),
        Rotation::Cw90 => image.rotate90(),
        Rotation::Cw180 => image.rotate180(),
        Rotation::Cw270 => image.rotate270(),
    }
}

/// Composite onto an opaque white background, dropping alpha.
pub fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as f32 / 255.0;
        let over = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        Rgb([over(r), over(g), over(b)])
    })
}

/// Downscale so the longer side is at most `max_dimension`. Never upscales.
pub fn downscale_to_fit(image: &DynamicImage, max_dimension: u32) -> DynamicImage {
    let longest = image.width().max(image.height());
    if longest <= max_dimension {
        return image.clone();
    }
    image.resize(max_dimension, max_dimension, FilterType::Triangle)
}

/// Encode as PNG (lossless).
pub fn to_png_bytes(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|err| ScanError::Encode(format!("PNG encoding failed: {}", err)))?;
    Ok(buffer)
}

/// Encode an opaque RGB buffer as JPEG with quality 1–100.
pub fn to_jpeg_bytes(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|err| ScanError::Encode(format!("JPEG encoding failed: {}", err)))?;
    Ok(buffer)
}
