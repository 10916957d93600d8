// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Contrast-boost fallback detection.
//
// Low-contrast card edges (a white card on a light table) are recoverable
// by boosting contrast on a copy of the frame and re-running the identical
// detection configuration. Loosening the detection thresholds globally
// would raise the false-positive rate instead.

use image::DynamicImage;
use tracing::debug;

use cardlens_core::config::PipelineConfig;
use cardlens_core::types::{DetectorSource, Observation};

use crate::detect::{QuadDetector, RectangleDetector};

/// Per-pixel contrast adjustment around the mid-gray point.
///
/// Values > 1.0 increase contrast; 1.0 is a no-op. Alpha is preserved.
pub fn boost_contrast(image: &DynamicImage, factor: f32) -> DynamicImage {
    let rgba = image.to_rgba8();

    let contrasted = image::ImageBuffer::from_fn(rgba.width(), rgba.height(), |x, y| {
        let image::Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let adjust = |channel: u8| -> u8 {
            let val = factor * (channel as f32 - 128.0) + 128.0;
            val.clamp(0.0, 255.0) as u8
        };
        image::Rgba([adjust(r), adjust(g), adjust(b), a])
    });

    DynamicImage::ImageRgba8(contrasted)
}

/// The production detector: primary pass plus contrast-boost fallback.
#[derive(Debug, Clone)]
pub struct CardDetector {
    primary: RectangleDetector,
    contrast_boost: f32,
}

impl CardDetector {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            primary: RectangleDetector::new(config.detector),
            contrast_boost: config.contrast_boost,
        }
    }
}

impl QuadDetector for CardDetector {
    fn detect(&self, image: &DynamicImage) -> Option<Observation> {
        if let Some(observation) = self.primary.detect(image) {
            return Some(observation);
        }

        // Primary pass found nothing — retry on a contrast-boosted copy.
        let boosted = boost_contrast(image, self.contrast_boost);
        let fallback = self
            .primary
            .detect_tagged(&boosted, DetectorSource::ContrastFallback);
        if fallback.is_some() {
            debug!(
                factor = self.contrast_boost,
                "fallback pass recovered a card"
            );
        }
        fallback
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn contrast_boost_spreads_values_around_midpoint() {
        let mut img = GrayImage::new(2, 1);
        img.put_pixel(0, 0, Luma([100u8]));
        img.put_pixel(1, 0, Luma([160u8]));

        let boosted = boost_contrast(&DynamicImage::ImageLuma8(img), 1.15).to_luma8();

        // 1.15 * (100 - 128) + 128 = 95.8; darker pixels get darker.
        assert!(boosted.get_pixel(0, 0).0[0] < 100);
        // 1.15 * (160 - 128) + 128 = 164.8; lighter pixels get lighter.
        assert!(boosted.get_pixel(1, 0).0[0] > 160);
    }

    #[test]
    fn contrast_boost_unity_factor_is_noop() {
        let mut img = GrayImage::new(3, 1);
        img.put_pixel(0, 0, Luma([0u8]));
        img.put_pixel(1, 0, Luma([128u8]));
        img.put_pixel(2, 0, Luma([255u8]));

        let out = boost_contrast(&DynamicImage::ImageLuma8(img.clone()), 1.0).to_luma8();
        for x in 0..3 {
            assert_eq!(out.get_pixel(x, 0).0[0], img.get_pixel(x, 0).0[0]);
        }
    }

    #[test]
    fn contrast_boost_clamps_extremes() {
        let mut img = GrayImage::new(2, 1);
        img.put_pixel(0, 0, Luma([5u8]));
        img.put_pixel(1, 0, Luma([250u8]));

        let out = boost_contrast(&DynamicImage::ImageLuma8(img), 3.0).to_luma8();
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn blank_frame_stays_undetected_through_fallback() {
        let detector = CardDetector::new(&PipelineConfig::new());
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 120, Luma([128u8])));
        assert!(detector.detect(&blank).is_none());
    }
}
