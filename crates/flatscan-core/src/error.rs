// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Flatscan.

use thiserror::Error;

/// Top-level error type for all Flatscan operations.
///
/// A detection miss is deliberately absent: finding no quadrilateral is a
/// normal outcome that callers answer with default corners.
#[derive(Debug, Error)]
pub enum ScanError {
    // -- Input --
    #[error("failed to decode source image: {0}")]
    Decode(String),

    #[error("source image is {size} bytes, above the {limit} byte limit")]
    SourceTooLarge { size: usize, limit: usize },

    #[error("could not allocate working raster: {0}")]
    ResourceAllocation(String),

    // -- Export --
    #[error("nothing to export")]
    NothingToExport,

    #[error("image encoding failed: {0}")]
    Encode(String),

    #[error("PDF generation failed: {0}")]
    Pdf(String),

    #[error("archive generation failed: {0}")]
    Archive(String),

    #[error("preview-resolution image cannot be exported")]
    PreviewNotExportable,

    // -- Session --
    #[error("page {0} not found")]
    PageNotFound(String),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("operation cancelled")]
    Cancelled,

    // -- Engine --
    #[error("image engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("image engine initialisation timed out after {0} ms")]
    EngineTimeout(u64),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanError>;
