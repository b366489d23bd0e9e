// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ZIP export — every page as a sequentially numbered JPEG.

use std::io::{Cursor, Write};

use flatscan_core::error::{Result, ScanError};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::naming::zip_entry_name;
use super::{CancelFlag, EncodedPage, ExportPage, ExportProgress, encode_page};

/// Deflate level for archive entries. JPEGs barely shrink; this is for
/// packaging, not size.
pub const ZIP_COMPRESSION_LEVEL: i64 = 6;

/// Incremental ZIP assembly. Entries are numbered in push order and padded
/// to the digit count of the `total` given up front.
pub struct ZipBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    total: usize,
    written: usize,
}

impl ZipBuilder {
    pub fn new(total: usize) -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(ZIP_COMPRESSION_LEVEL)),
            total,
            written: 0,
        }
    }

    pub fn push(&mut self, encoded: &EncodedPage) -> Result<()> {
        let name = zip_entry_name(self.written, self.total);
        self.writer
            .start_file(name.as_str(), self.options)
            .map_err(|err| ScanError::Archive(format!("failed to add {}: {}", name, err)))?;
        self.writer
            .write_all(&encoded.jpeg)
            .map_err(|err| ScanError::Archive(format!("failed to write {}: {}", name, err)))?;
        self.written += 1;

        debug!(entry = %name, bytes = encoded.jpeg.len(), "Archive entry written");
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        let cursor = self
            .writer
            .finish()
            .map_err(|err| ScanError::Archive(format!("failed to finalise archive: {}", err)))?;
        let bytes = cursor.into_inner();

        info!(entries = self.written, bytes = bytes.len(), "ZIP assembled");
        Ok(bytes)
    }
}

pub(crate) fn write_zip(
    pages: &[ExportPage],
    quality: u8,
    progress: &mut dyn FnMut(ExportProgress),
    cancel: &CancelFlag,
) -> Result<Vec<u8>> {
    let total = pages.len();
    let mut builder = ZipBuilder::new(total);

    for (index, page) in pages.iter().enumerate() {
        cancel.check()?;
        let encoded = encode_page(&page.image, page.rotation, quality)?;
        builder.push(&encoded)?;
        progress(ExportProgress {
            completed: index + 1,
            total,
        });
    }

    builder.finish()
}
