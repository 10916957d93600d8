// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Orientation normalization of the final capture.

use image::DynamicImage;
use tracing::debug;

/// Ensure the delivered image is landscape (width >= height).
///
/// Portrait images are rotated 90 degrees; landscape and square images pass
/// through unchanged, which makes the operation idempotent. This runs on
/// every capture, whether or not rectification succeeded.
pub fn normalize_landscape(image: DynamicImage) -> DynamicImage {
    if image.height() > image.width() {
        debug!(
            width = image.width(),
            height = image.height(),
            "rotating portrait capture to landscape"
        );
        image.rotate90()
    } else {
        image
    }
}

// -- Tests --------------------------------------------------------------------
