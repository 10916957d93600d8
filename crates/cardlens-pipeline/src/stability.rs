// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Frame-to-frame stability tracking.
//
// The tracker compares each observation against the immediately preceding
// one, not against an anchor frame: slow drift (hand tremor) can still
// stabilize, while any single jump past the tolerance restarts the count.

use tracing::debug;

use cardlens_core::config::StabilityConfig;
use cardlens_core::types::Observation;

/// Result of evaluating one frame against the tracker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityOutcome {
    /// No card was observed this frame; all stability state was cleared.
    NotDetected,
    /// A card is present. `stable_frames` is the current run length of
    /// consecutive within-tolerance frames (0 right after a fresh or
    /// jittered observation).
    Detected { stable_frames: u32 },
    /// The required run of stable frames was just completed. Reported
    /// exactly once per run; the counter restarts from zero afterwards.
    StabilityReached,
}

/// Owns the last accepted observation and the consecutive-stable counter.
///
/// Single-writer by construction: the pipeline applies frame results to
/// this state strictly in frame order.
#[derive(Debug)]
pub struct StabilityTracker {
    config: StabilityConfig,
    last: Option<Observation>,
    stable_frames: u32,
}

impl StabilityTracker {
    pub fn new(config: StabilityConfig) -> Self {
        Self {
            config,
            last: None,
            stable_frames: 0,
        }
    }

    /// The most recent observation, if any. Snapshot this into a capture
    /// request; it is overwritten on every frame.
    pub fn last(&self) -> Option<&Observation> {
        self.last.as_ref()
    }

    /// Clear all tracking state.
    pub fn reset(&mut self) {
        self.last = None;
        self.stable_frames = 0;
    }

    /// Fold one frame's detection result into the tracker.
    pub fn evaluate(&mut self, current: Option<Observation>) -> StabilityOutcome {
        let Some(current) = current else {
            self.reset();
            return StabilityOutcome::NotDetected;
        };

        let Some(previous) = self.last.replace(current) else {
            // First sighting: nothing to compare against yet.
            return StabilityOutcome::Detected { stable_frames: 0 };
        };

        if previous
            .quad
            .within_tolerance(&current.quad, self.config.corner_tolerance)
        {
            self.stable_frames += 1;
            if self.stable_frames >= self.config.required_stable_frames {
                debug!(
                    frames = self.stable_frames,
                    "stability threshold reached"
                );
                // A fresh run is required before the next auto-capture.
                self.stable_frames = 0;
                return StabilityOutcome::StabilityReached;
            }
        } else {
            self.stable_frames = 0;
        }

        StabilityOutcome::Detected {
            stable_frames: self.stable_frames,
        }
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cardlens_core::types::{DetectorSource, Quad};

    fn config(required: u32) -> StabilityConfig {
        StabilityConfig {
            corner_tolerance: 0.015,
            required_stable_frames: required,
        }
    }

    fn observation(offset: f32) -> Observation {
        Observation {
            quad: Quad::axis_aligned(0.2 + offset, 0.2 + offset, 0.8 + offset, 0.8 + offset),
            confidence: 0.9,
            source: DetectorSource::Primary,
        }
    }

    #[test]
    fn first_observation_is_detected_but_not_stable() {
        let mut tracker = StabilityTracker::new(config(3));
        assert_eq!(
            tracker.evaluate(Some(observation(0.0))),
            StabilityOutcome::Detected { stable_frames: 0 }
        );
    }

    #[test]
    fn within_tolerance_frames_increment_until_threshold() {
        let mut tracker = StabilityTracker::new(config(3));
        tracker.evaluate(Some(observation(0.0)));

        assert_eq!(
            tracker.evaluate(Some(observation(0.001))),
            StabilityOutcome::Detected { stable_frames: 1 }
        );
        assert_eq!(
            tracker.evaluate(Some(observation(0.002))),
            StabilityOutcome::Detected { stable_frames: 2 }
        );
        assert_eq!(
            tracker.evaluate(Some(observation(0.001))),
            StabilityOutcome::StabilityReached
        );
    }

    #[test]
    fn threshold_reported_once_then_fresh_count() {
        let mut tracker = StabilityTracker::new(config(2));
        tracker.evaluate(Some(observation(0.0)));
        tracker.evaluate(Some(observation(0.0)));
        assert_eq!(
            tracker.evaluate(Some(observation(0.0))),
            StabilityOutcome::StabilityReached
        );

        // Frames keep coming in stable; the count restarts from zero.
        assert_eq!(
            tracker.evaluate(Some(observation(0.0))),
            StabilityOutcome::Detected { stable_frames: 1 }
        );
        assert_eq!(
            tracker.evaluate(Some(observation(0.0))),
            StabilityOutcome::StabilityReached
        );
    }

    #[test]
    fn out_of_tolerance_jump_resets_counter() {
        let mut tracker = StabilityTracker::new(config(5));
        tracker.evaluate(Some(observation(0.0)));
        tracker.evaluate(Some(observation(0.0)));
        tracker.evaluate(Some(observation(0.0)));

        // 0.02 per axis => 0.04 Manhattan per corner, well past 0.015.
        assert_eq!(
            tracker.evaluate(Some(observation(0.02))),
            StabilityOutcome::Detected { stable_frames: 0 }
        );

        // The jumped-to observation became the new reference.
        assert_eq!(
            tracker.evaluate(Some(observation(0.02))),
            StabilityOutcome::Detected { stable_frames: 1 }
        );
    }

    #[test]
    fn slow_drift_still_stabilizes() {
        // Each step moves corners by 0.01 Manhattan (0.005 per axis) —
        // within tolerance of the immediately preceding frame, though the
        // first and last frames are far apart. Consecutive-frame
        // comparison lets this stabilize.
        let mut tracker = StabilityTracker::new(config(3));
        tracker.evaluate(Some(observation(0.000)));
        tracker.evaluate(Some(observation(0.005)));
        tracker.evaluate(Some(observation(0.010)));
        assert_eq!(
            tracker.evaluate(Some(observation(0.015))),
            StabilityOutcome::StabilityReached
        );
    }

    #[test]
    fn missing_observation_clears_everything() {
        let mut tracker = StabilityTracker::new(config(3));
        tracker.evaluate(Some(observation(0.0)));
        tracker.evaluate(Some(observation(0.0)));
        assert!(tracker.last().is_some());

        assert_eq!(tracker.evaluate(None), StabilityOutcome::NotDetected);
        assert!(tracker.last().is_none());

        // The next observation starts over as a first sighting.
        assert_eq!(
            tracker.evaluate(Some(observation(0.0))),
            StabilityOutcome::Detected { stable_frames: 0 }
        );
    }

    #[test]
    fn default_threshold_takes_thirty_stable_comparisons() {
        let mut tracker = StabilityTracker::new(StabilityConfig::default());
        tracker.evaluate(Some(observation(0.0)));
        for i in 1..30 {
            assert_eq!(
                tracker.evaluate(Some(observation(0.0))),
                StabilityOutcome::Detected { stable_frames: i }
            );
        }
        assert_eq!(
            tracker.evaluate(Some(observation(0.0))),
            StabilityOutcome::StabilityReached
        );
    }
}
