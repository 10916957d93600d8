// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Single-frame rectangle detection.
//
// Finds the dominant card-shaped quadrilateral in a video frame using edge
// detection and the Hough line transform, then filters candidates against a
// fixed configuration (aspect-ratio band, minimum relative size, confidence
// floor, at most one result). Detection failures of any kind are reported
// as "no observation" — a missed frame costs one frame of latency, so
// nothing here escalates.

use image::{DynamicImage, GrayImage};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::hough::{LineDetectionOptions, PolarLine, detect_lines};
use tracing::{debug, trace};

use cardlens_core::config::DetectorConfig;
use cardlens_core::types::{DetectorSource, NormPoint, Observation, Quad};

/// A source of per-frame card observations.
///
/// The pipeline depends on this seam rather than on the concrete detector so
/// the state machine can be exercised with scripted observations.
pub trait QuadDetector: Send + Sync {
    /// Detect at most one card quadrilateral in the given image.
    ///
    /// Returns `None` for frames without a clean detection; internal errors
    /// are logged by the implementation, never propagated.
    fn detect(&self, image: &DynamicImage) -> Option<Observation>;
}

/// The primary single-frame detector with its fixed configuration.
#[derive(Debug, Clone)]
pub struct RectangleDetector {
    config: DetectorConfig,
}

impl RectangleDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Run detection and tag the resulting observation with `source`.
    ///
    /// Used by the fallback pass, which runs the identical configuration on
    /// a contrast-boosted copy of the frame.
    pub(crate) fn detect_tagged(
        &self,
        image: &DynamicImage,
        source: DetectorSource,
    ) -> Option<Observation> {
        let gray = image.to_luma8();
        let corners = find_card_corners(&gray)?;
        let observation = filter_candidate(&self.config, &corners, gray.width(), gray.height())?;
        debug!(
            confidence = observation.confidence,
            ?source,
            "card quadrilateral accepted"
        );
        Some(Observation {
            source,
            ..observation
        })
    }
}

impl QuadDetector for RectangleDetector {
    fn detect(&self, image: &DynamicImage) -> Option<Observation> {
        self.detect_tagged(image, DetectorSource::Primary)
    }
}

/// Pixel-space corner candidates ordered top-left, top-right, bottom-right,
/// bottom-left (image convention: y grows downward).
type PixelCorners = [(f32, f32); 4];

/// Locate the dominant quadrilateral in a grayscale frame.
///
/// Pipeline: Gaussian blur (sigma 2.0) → Canny (50/150) → Hough line
/// detection with a vote threshold proportional to the image diagonal →
/// classify lines as horizontal/vertical → take the four extreme edges →
/// intersect them pairwise into corners.
fn find_card_corners(gray: &GrayImage) -> Option<PixelCorners> {
    let (width, height) = gray.dimensions();
    if width < 8 || height < 8 {
        return None;
    }

    let blurred = gaussian_blur_f32(gray, 2.0);
    let edges = canny(&blurred, 50.0, 150.0);

    // Scale the vote threshold with resolution so detection behaves the
    // same on preview-sized and full-resolution frames.
    let diagonal = ((width as f64).powi(2) + (height as f64).powi(2)).sqrt();
    let vote_threshold = (diagonal * 0.25).max(80.0) as u32;
    let lines = detect_lines(
        &edges,
        LineDetectionOptions {
            vote_threshold,
            suppression_radius: 8,
        },
    );
    trace!(line_count = lines.len(), vote_threshold, "Hough lines");

    if lines.len() < 4 {
        return None;
    }

    let (horizontal, vertical) = split_by_orientation(&lines);
    if horizontal.len() < 2 || vertical.len() < 2 {
        trace!(
            horizontal = horizontal.len(),
            vertical = vertical.len(),
            "not enough edge candidates"
        );
        return None;
    }

    // Extreme lines bound the card: nearest/farthest from the origin in
    // each orientation bucket.
    let top = extreme_line(&horizontal, Extreme::Near)?;
    let bottom = extreme_line(&horizontal, Extreme::Far)?;
    let left = extreme_line(&vertical, Extreme::Near)?;
    let right = extreme_line(&vertical, Extreme::Far)?;
    // (A horizontal line sits at y = r, so Near is the top edge; a vertical
    // line sits at x = r, so Near is the left edge.)

    let top_left = line_intersection(&top, &left)?;
    let top_right = line_intersection(&top, &right)?;
    let bottom_right = line_intersection(&bottom, &right)?;
    let bottom_left = line_intersection(&bottom, &left)?;

    let corners = [top_left, top_right, bottom_right, bottom_left];

    // Corners wildly outside the frame mean the line pairing was spurious.
    let margin_x = width as f32 * 0.05;
    let margin_y = height as f32 * 0.05;
    for (x, y) in &corners {
        if *x < -margin_x
            || *y < -margin_y
            || *x > width as f32 + margin_x
            || *y > height as f32 + margin_y
        {
            trace!(x, y, "corner outside frame; rejecting candidate");
            return None;
        }
    }

    Some(corners)
}

/// Apply the fixed configuration to a raw corner candidate.
///
/// Checks aspect ratio, relative size, and confidence, then converts pixel
/// corners (top-left origin) into the normalized bottom-left-origin
/// coordinates used by `Observation`.
fn filter_candidate(
    config: &DetectorConfig,
    corners: &PixelCorners,
    width: u32,
    height: u32,
) -> Option<Observation> {
    if config.max_candidates == 0 {
        return None;
    }

    let aspect = aspect_ratio(corners)?;
    if aspect < config.aspect_ratio_min || aspect > config.aspect_ratio_max {
        trace!(aspect, "aspect ratio outside band");
        return None;
    }

    let quad_area = polygon_area(corners);
    let image_area = width as f32 * height as f32;
    let relative_size = (quad_area / image_area).max(0.0).sqrt();
    if relative_size < config.min_relative_size {
        trace!(relative_size, "candidate too small");
        return None;
    }

    let confidence = rectangularity(corners);
    if confidence < config.min_confidence {
        trace!(confidence, "confidence below floor");
        return None;
    }

    let normalize = |(x, y): (f32, f32)| NormPoint {
        x: (x / width as f32).clamp(0.0, 1.0),
        // Flip the vertical axis: image rows grow downward, normalized
        // coordinates grow upward from the bottom-left.
        y: (1.0 - y / height as f32).clamp(0.0, 1.0),
    };

    let [tl, tr, br, bl] = *corners;
    Some(Observation {
        quad: Quad {
            top_left: normalize(tl),
            top_right: normalize(tr),
            bottom_left: normalize(bl),
            bottom_right: normalize(br),
        },
        confidence,
        source: DetectorSource::Primary,
    })
}

/// Width/height ratio from averaged opposite side lengths.
fn aspect_ratio(corners: &PixelCorners) -> Option<f32> {
    let [tl, tr, br, bl] = *corners;
    let width = 0.5 * (distance(tl, tr) + distance(bl, br));
    let height = 0.5 * (distance(tl, bl) + distance(tr, br));
    if height <= f32::EPSILON {
        return None;
    }
    Some(width / height)
}

/// How rectangular a quadrilateral is, in [0, 1].
///
/// Combines two penalties: imbalance between opposite side lengths, and
/// corner angles deviating from 90 degrees. A perfect rectangle scores 1.0;
/// a strongly sheared or trapezoidal shape drops well below the 0.7 floor.
fn rectangularity(corners: &PixelCorners) -> f32 {
    let [tl, tr, br, bl] = *corners;

    let top = distance(tl, tr);
    let bottom = distance(bl, br);
    let left = distance(tl, bl);
    let right = distance(tr, br);

    let width = 0.5 * (top + bottom);
    let height = 0.5 * (left + right);
    if width <= f32::EPSILON || height <= f32::EPSILON {
        return 0.0;
    }

    let side_balance =
        1.0 - 0.5 * ((top - bottom).abs() / width + (left - right).abs() / height);

    // Mean |cos| of the corner angles; 0 for right angles.
    let ring = [tl, tr, br, bl];
    let mut skew = 0.0f32;
    for i in 0..4 {
        let prev = ring[(i + 3) % 4];
        let here = ring[i];
        let next = ring[(i + 1) % 4];
        skew += corner_cos(prev, here, next).abs();
    }
    let angle_score = 1.0 - skew / 4.0;

    (side_balance.clamp(0.0, 1.0) * angle_score.clamp(0.0, 1.0)).clamp(0.0, 1.0)
}

/// Cosine of the angle at `here` formed by the edges to `prev` and `next`.
fn corner_cos(prev: (f32, f32), here: (f32, f32), next: (f32, f32)) -> f32 {
    let a = (prev.0 - here.0, prev.1 - here.1);
    let b = (next.0 - here.0, next.1 - here.1);
    let norm = (a.0.hypot(a.1)) * (b.0.hypot(b.1));
    if norm <= f32::EPSILON {
        return 1.0; // Degenerate corner counts as maximally skewed.
    }
    (a.0 * b.0 + a.1 * b.1) / norm
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

/// Shoelace area of a pixel-space quadrilateral.
fn polygon_area(corners: &PixelCorners) -> f32 {
    let mut area = 0.0f32;
    for i in 0..4 {
        let j = (i + 1) % 4;
        area += corners[i].0 * corners[j].1;
        area -= corners[j].0 * corners[i].1;
    }
    area.abs() / 2.0
}

/// Bucket Hough lines into roughly horizontal and roughly vertical sets.
///
/// `angle_in_degrees` (0..180) is the direction of the line's normal: a line
/// satisfies `x cos(theta) + y sin(theta) = r`, so angles near 90 describe
/// horizontal card edges (y = r) and angles near 0 or 180 vertical ones
/// (x = ±r). Lines in the ambiguous diagonal zones are discarded.
fn split_by_orientation(lines: &[PolarLine]) -> (Vec<PolarLine>, Vec<PolarLine>) {
    let mut horizontal = Vec::new();
    let mut vertical = Vec::new();

    for line in lines {
        let angle = line.angle_in_degrees;
        if (60..=120).contains(&angle) {
            horizontal.push(*line);
        } else if angle <= 30 || angle >= 150 {
            vertical.push(*line);
        }
    }

    (horizontal, vertical)
}

/// Which end of the `r` range to pick from an orientation bucket.
#[derive(Debug, Clone, Copy)]
enum Extreme {
    /// Smallest signed distance from the origin (top / left edge).
    Near,
    /// Largest signed distance from the origin (bottom / right edge).
    Far,
}

fn extreme_line(lines: &[PolarLine], which: Extreme) -> Option<PolarLine> {
    let ordering = |a: &&PolarLine, b: &&PolarLine| {
        a.r.partial_cmp(&b.r).unwrap_or(std::cmp::Ordering::Equal)
    };
    match which {
        Extreme::Near => lines.iter().min_by(ordering).copied(),
        Extreme::Far => lines.iter().max_by(ordering).copied(),
    }
}

/// Intersection of two lines in polar (Hough) form.
///
/// A `PolarLine` `(r, theta)` represents `x cos(theta) + y sin(theta) = r`.
/// Returns `None` for (nearly) parallel lines.
fn line_intersection(a: &PolarLine, b: &PolarLine) -> Option<(f32, f32)> {
    let theta_a = (a.angle_in_degrees as f64).to_radians();
    let theta_b = (b.angle_in_degrees as f64).to_radians();

    let (sin_a, cos_a) = theta_a.sin_cos();
    let (sin_b, cos_b) = theta_b.sin_cos();

    let denom = cos_a * sin_b - sin_a * cos_b;
    if denom.abs() < 1e-6 {
        return None;
    }

    let (r_a, r_b) = (a.r as f64, b.r as f64);
    let x = (r_a * sin_b - r_b * sin_a) / denom;
    let y = (r_b * cos_a - r_a * cos_b) / denom;
    Some((x as f32, y as f32))
}

// -- Tests --------------------------------------------------------------------
