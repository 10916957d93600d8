// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective rectification of a detected card quadrilateral.
//
// Maps the quadrilateral onto its axis-aligned bounding rectangle via a
// projective transform. Every failure mode (degenerate transform, zero-sized
// output) falls back to returning the original image unchanged — a capture
// must never be lost to a rectification failure.

use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use tracing::{debug, instrument, warn};

use cardlens_core::types::Quad;

/// Rectify the card region of `image` described by `quad`.
///
/// The quad's normalized bottom-left-origin corners are converted to
/// absolute pixel coordinates (flipping the vertical axis to the image
/// convention), then warped onto the quad's bounding rectangle with
/// bilinear interpolation.
#[instrument(skip(image, quad), fields(width = image.width(), height = image.height()))]
pub fn rectify(image: &DynamicImage, quad: &Quad) -> DynamicImage {
    let (width, height) = (image.width() as f32, image.height() as f32);

    // Denormalize with a vertical flip: normalized y grows upward, pixel
    // rows grow downward.
    let to_pixels = |p: cardlens_core::types::NormPoint| -> (f32, f32) {
        (p.x * width, (1.0 - p.y) * height)
    };

    let top_left = to_pixels(quad.top_left);
    let top_right = to_pixels(quad.top_right);
    let bottom_right = to_pixels(quad.bottom_right);
    let bottom_left = to_pixels(quad.bottom_left);
    let src = [top_left, top_right, bottom_right, bottom_left];

    // Output rectangle: the quad's bounding box.
    let xs = [top_left.0, top_right.0, bottom_right.0, bottom_left.0];
    let ys = [top_left.1, top_right.1, bottom_right.1, bottom_left.1];
    let min = |vals: &[f32; 4]| vals.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = |vals: &[f32; 4]| vals.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

    let out_w = (max(&xs) - min(&xs)).round() as u32;
    let out_h = (max(&ys) - min(&ys)).round() as u32;
    if out_w == 0 || out_h == 0 {
        warn!(out_w, out_h, "degenerate crop rectangle; returning original");
        return image.clone();
    }

    let dest: [(f32, f32); 4] = [
        (0.0, 0.0),
        (out_w as f32, 0.0),
        (out_w as f32, out_h as f32),
        (0.0, out_h as f32),
    ];

    let projection = match Projection::from_control_points(src, dest) {
        Some(p) => p,
        None => {
            warn!("projective transform unavailable for quad; returning original");
            return image.clone();
        }
    };

    let rgba = image.to_rgba8();
    let mut output = RgbaImage::new(out_w, out_h);
    warp_into(
        &rgba,
        &projection,
        Interpolation::Bilinear,
        Rgba([255u8, 255, 255, 255]),
        &mut output,
    );

    debug!(out_w, out_h, "card region rectified");
    DynamicImage::ImageRgba8(output)
}

// -- Tests --------------------------------------------------------------------
