// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanning pipeline — document boundary detection and perspective rectification.

pub mod detect;
pub mod rectify;

pub use detect::{Detection, EdgeDetector};
pub use rectify::{RectifyStrategy, Rectifier};
