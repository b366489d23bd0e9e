// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Download filenames for exported scans.

use chrono::{Local, NaiveDate};

/// Today's date in the local time zone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// `scan_<YYYY-MM-DD>.pdf`
pub fn pdf_filename(date: NaiveDate) -> String {
    format!("scan_{}.pdf", date.format("%Y-%m-%d"))
}

/// `scan_<YYYY-MM-DD>.jpg`, or `scan_<YYYY-MM-DD>_<n>.jpg` for page `n` of a
/// multi-page scan.
pub fn jpg_filename(date: NaiveDate, page_number: Option<usize>) -> String {
    match page_number {
        Some(n) => format!("scan_{}_{}.jpg", date.format("%Y-%m-%d"), n),
        None => format!("scan_{}.jpg", date.format("%Y-%m-%d")),
    }
}

/// `scan_<YYYY-MM-DD>.zip`
pub fn zip_filename(date: NaiveDate) -> String {
    format!("scan_{}.zip", date.format("%Y-%m-%d"))
}

/// Entry name inside the ZIP for the page at zero-based `index`, zero-padded
/// to the number of digits in `total`.
pub fn zip_entry_name(index: usize, total: usize) -> String {
    let width = total.max(1).to_string().len();
    format!("scan_{:0width$}.jpg", index + 1, width = width)
}
