// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Cardlens capture pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a single still-capture attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureId(pub Uuid);

impl CaptureId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CaptureId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CaptureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 2D point in normalized image coordinates.
///
/// Coordinates lie in [0, 1] with the origin at the bottom-left of the
/// image, matching the convention of the upstream rectangle detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormPoint {
    pub x: f32,
    pub y: f32,
}

impl NormPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Manhattan (L1) distance to another point.
    pub fn manhattan(&self, other: &NormPoint) -> f32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// A detected card boundary: four corners in normalized coordinates.
///
/// Corner names follow the card as seen in the image. The quad is replaced
/// wholesale on every frame — it is never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub top_left: NormPoint,
    pub top_right: NormPoint,
    pub bottom_left: NormPoint,
    pub bottom_right: NormPoint,
}

impl Quad {
    /// Corners in a fixed order: top-left, top-right, bottom-left,
    /// bottom-right. Stability comparison relies on this order being the
    /// same for both quads.
    pub fn corners(&self) -> [NormPoint; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_left,
            self.bottom_right,
        ]
    }

    /// Whether every corresponding corner of `other` is within `tolerance`
    /// (strict) Manhattan distance of this quad's corner.
    ///
    /// Per-corner thresholding (rather than centroid or area deltas)
    /// rejects rotation and skew jitter as well as translation.
    pub fn within_tolerance(&self, other: &Quad, tolerance: f32) -> bool {
        self.corners()
            .iter()
            .zip(other.corners().iter())
            .all(|(a, b)| a.manhattan(b) < tolerance)
    }

    /// Area of the quadrilateral via the shoelace formula, in the quad's
    /// own coordinate units (normalized area for normalized quads).
    pub fn area(&self) -> f32 {
        // Walk the perimeter: TL -> TR -> BR -> BL.
        let ring = [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ];
        let mut area = 0.0f32;
        for i in 0..4 {
            let j = (i + 1) % 4;
            area += ring[i].x * ring[j].y;
            area -= ring[j].x * ring[i].y;
        }
        area.abs() / 2.0
    }

    /// Axis-aligned quad spanning (x0, y0) to (x1, y1), where y grows
    /// upward (bottom-left origin).
    pub fn axis_aligned(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            top_left: NormPoint::new(x0, y1),
            top_right: NormPoint::new(x1, y1),
            bottom_left: NormPoint::new(x0, y0),
            bottom_right: NormPoint::new(x1, y0),
        }
    }

    /// The full-frame quad (the whole image).
    pub fn full_frame() -> Self {
        Self::axis_aligned(0.0, 0.0, 1.0, 1.0)
    }
}

/// Which detection pass produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorSource {
    /// The primary detection pass on the raw frame.
    Primary,
    /// The fallback pass on a contrast-boosted copy of the frame.
    ContrastFallback,
}

/// One frame's detected card boundary plus its confidence score.
///
/// At most one observation is current at a time; each frame replaces it
/// wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub quad: Quad,
    /// Detector confidence in [0, 1].
    pub confidence: f32,
    pub source: DetectorSource,
}

/// Camera permission state reported by the capture subsystem.
///
/// Non-authorized states simply mean no frames arrive; they are logged
/// once, never surfaced as pipeline errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraAuthorization {
    Authorized,
    NotDetermined,
    Denied,
}

// -- Tests --------------------------------------------------------------------
