// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// cardlens-vision — Single-frame card detection and image rectification.
//
// Provides the rectangle detection primitive (edge detection + Hough lines +
// corner intersection), the contrast-boost fallback pass, perspective
// rectification of a detected quadrilateral, and orientation normalization
// of the final capture.

pub mod detect;
pub mod enhance;
pub mod orient;
pub mod rectify;
pub mod still;

// Re-export the primary entry points so callers can use
// `cardlens_vision::CardDetector` etc.
pub use detect::{QuadDetector, RectangleDetector};
pub use enhance::CardDetector;
pub use orient::normalize_landscape;
pub use rectify::rectify;
pub use still::finalize_still;
