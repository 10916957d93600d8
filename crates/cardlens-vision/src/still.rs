// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Finalization of a captured still: post-hoc detection, rectification, and
// orientation normalization.

use image::DynamicImage;
use tracing::{info, instrument};

use cardlens_core::types::Observation;

use crate::detect::QuadDetector;
use crate::orient::normalize_landscape;
use crate::rectify::rectify;

/// Turn a raw captured still into the delivered artifact.
///
/// If the capture carried no observation (manual trigger without a live
/// detection), detection runs once more on the still itself. A found quad
/// is rectified; a miss degrades to the raw still. The result is always
/// orientation-normalized, so the caller receives a landscape image no
/// matter which path was taken.
#[instrument(skip_all, fields(width = image.width(), height = image.height(), had_observation = observation.is_some()))]
pub fn finalize_still(
    image: DynamicImage,
    observation: Option<&Observation>,
    detector: &dyn QuadDetector,
) -> DynamicImage {
    let observation = observation.copied().or_else(|| {
        info!("no stored observation; running post-hoc detection on still");
        detector.detect(&image)
    });

    let rectified = match observation {
        Some(obs) => rectify(&image, &obs.quad),
        None => {
            info!("no card found in still; delivering unrectified capture");
            image
        }
    };

    normalize_landscape(rectified)
}

// -- Tests --------------------------------------------------------------------
