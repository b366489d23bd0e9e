// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// flatscan-document — Image pipeline for the Flatscan document scanner.
//
// Detects page boundaries in photos, rectifies the perspective, applies
// reading filters, and exports the result as PDF, JPG, or a ZIP of JPGs.

pub mod engine;
pub mod export;
pub mod filter;
pub mod geometry;
pub mod raster;
pub mod scan;
pub mod session;

// Re-export the primary structs so callers can use `flatscan_document::ScanSession` etc.
pub use engine::{EngineLoader, EngineState, ImageEngine};
pub use export::{CancelFlag, ExportEngine, ExportPage, ExportProgress, PdfMetadata};
pub use filter::{CacheStats, FilterCache, FilterEngine, FilterMode, FilteredImage};
pub use scan::{Detection, EdgeDetector, Rectifier, RectifyStrategy};
pub use session::{Page, ScanSession};
