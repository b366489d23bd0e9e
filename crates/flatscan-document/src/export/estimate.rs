// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF size estimation — runs the real JPEG pipeline and adds a fixed
// allowance for PDF structure.

use flatscan_core::error::Result;
use tracing::debug;

use super::{EncodedPage, ExportPage, encode_page};

/// Header, catalog, page tree, info dictionary, xref table, and trailer.
pub const PDF_DOCUMENT_OVERHEAD: u64 = 1024;

/// Page dictionary, content stream, image dictionary, and xref entries.
pub const PDF_PAGE_OVERHEAD: u64 = 512;

/// Estimated PDF size in bytes for `pages` encoded at `quality` (1–100).
///
/// Each page is rotated and encoded exactly as the PDF export would, so the
/// image bytes are measured rather than guessed.
pub fn estimate_pdf_size(pages: &[ExportPage], quality: u8) -> Result<u64> {
    let mut total = PDF_DOCUMENT_OVERHEAD;
    for page in pages {
        total += page_bytes(&encode_page(&page.image, page.rotation, quality)?);
    }
    debug!(pages = pages.len(), quality, bytes = total, "Estimated PDF size");
    Ok(total)
}

/// Contribution of one encoded page to the PDF size.
pub fn page_bytes(encoded: &EncodedPage) -> u64 {
    encoded.jpeg.len() as u64 + PDF_PAGE_OVERHEAD
}
