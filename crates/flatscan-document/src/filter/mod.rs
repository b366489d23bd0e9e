// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Filters — the five page looks and the per-page result cache.

pub mod cache;
pub mod engine;

pub use cache::{CacheStats, FilterCache};
pub use engine::{FilterEngine, FilterMode, FilteredImage};
