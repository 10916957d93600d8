// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Capture session state machine.
//
// The orchestrator is a pure state machine: inputs are frame results and
// control signals, outputs are effect values the runner interprets. No
// camera, image, or channel types appear in the transitions, which keeps
// every path testable synchronously.

use image::DynamicImage;
use tracing::{debug, info};

use cardlens_core::config::StabilityConfig;
use cardlens_core::types::{CaptureId, Observation};

use crate::stability::{StabilityOutcome, StabilityTracker};

/// Where the session currently is in its capture lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    /// Detection disabled; frames are ignored.
    Idle,
    /// Detection active, no stable card yet.
    Scanning,
    /// A card is being held steady; the stable-frame counter is running.
    StableCountdown,
    /// A still-capture request is in flight. Frame results still feed the
    /// detection flag, but no further captures start until completion.
    Capturing,
}

/// Side effects requested by a transition, interpreted by the runner.
pub enum SessionEffect {
    /// The card-detected flag flipped; notify the UI collaborator.
    /// Fired on edge transitions only, never twice with the same value.
    NotifyDetection(bool),
    /// Begin a still capture. The observation is an immutable snapshot
    /// attached to this request; a later frame cannot overwrite it.
    StartCapture {
        id: CaptureId,
        observation: Option<Observation>,
    },
    /// Deliver the finished (or failed) photo for a capture attempt.
    /// Exactly one per accepted request.
    DeliverPhoto {
        id: CaptureId,
        image: Option<DynamicImage>,
    },
}

/// The single owner of all cross-frame mutable state.
pub struct CaptureSession {
    phase: CapturePhase,
    tracker: StabilityTracker,
    /// Whether the external collaborator wants detection running.
    active: bool,
    /// Last value reported through `NotifyDetection`.
    card_detected: bool,
    /// A manual request arrived while a capture was in flight; coalesced
    /// into one follow-up capture on completion.
    pending_manual: bool,
}

impl CaptureSession {
    pub fn new(config: StabilityConfig) -> Self {
        Self {
            phase: CapturePhase::Idle,
            tracker: StabilityTracker::new(config),
            active: false,
            card_detected: false,
            pending_manual: false,
        }
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn card_detected(&self) -> bool {
        self.card_detected
    }

    /// Enable or disable detection.
    ///
    /// Disabling clears stability state and lowers the detection flag, but
    /// never aborts an in-flight capture: its photo is still delivered,
    /// after which the session settles in `Idle`.
    pub fn set_active(&mut self, active: bool) -> Vec<SessionEffect> {
        if self.active == active {
            return Vec::new();
        }
        self.active = active;
        info!(active, "detection toggled");

        let mut effects = Vec::new();
        if active {
            if self.phase == CapturePhase::Idle {
                self.phase = CapturePhase::Scanning;
            }
        } else {
            self.tracker.reset();
            if self.card_detected {
                self.card_detected = false;
                effects.push(SessionEffect::NotifyDetection(false));
            }
            if self.phase != CapturePhase::Capturing {
                self.phase = CapturePhase::Idle;
            }
        }
        effects
    }

    /// Apply one frame's detection result.
    pub fn handle_frame_result(&mut self, observation: Option<Observation>) -> Vec<SessionEffect> {
        if !self.active {
            return Vec::new();
        }

        let mut effects = Vec::new();

        // Edge-triggered detection flag: fire only on transitions.
        let detected = observation.is_some();
        if detected != self.card_detected {
            self.card_detected = detected;
            effects.push(SessionEffect::NotifyDetection(detected));
        }

        match self.tracker.evaluate(observation) {
            StabilityOutcome::NotDetected => {
                if self.phase == CapturePhase::StableCountdown {
                    self.phase = CapturePhase::Scanning;
                }
            }
            StabilityOutcome::Detected { stable_frames } => {
                if self.phase != CapturePhase::Capturing {
                    self.phase = if stable_frames > 0 {
                        CapturePhase::StableCountdown
                    } else {
                        CapturePhase::Scanning
                    };
                }
            }
            StabilityOutcome::StabilityReached => {
                if self.phase == CapturePhase::Capturing {
                    // A capture is already in flight; this run's trigger is
                    // dropped and a fresh stability run starts over.
                    debug!("stability reached during capture; ignored");
                } else {
                    let id = CaptureId::new();
                    info!(%id, "stability threshold reached; triggering auto-capture");
                    self.phase = CapturePhase::Capturing;
                    effects.push(SessionEffect::StartCapture {
                        id,
                        observation: self.tracker.last().copied(),
                    });
                }
            }
        }

        effects
    }

    /// Handle an edge-triggered manual capture request.
    ///
    /// Works from any state and bypasses the stability countdown. Without a
    /// live observation the capture proceeds anyway; cropping then relies
    /// on post-hoc detection against the still.
    pub fn request_manual_capture(&mut self) -> Vec<SessionEffect> {
        if self.phase == CapturePhase::Capturing {
            info!("manual capture requested while busy; coalescing");
            self.pending_manual = true;
            return Vec::new();
        }

        let id = CaptureId::new();
        info!(%id, "manual capture requested");
        self.phase = CapturePhase::Capturing;
        vec![SessionEffect::StartCapture {
            id,
            observation: self.tracker.last().copied(),
        }]
    }

    /// Complete a capture attempt with its finished image (or `None` on
    /// capture/conversion failure).
    pub fn complete_capture(
        &mut self,
        id: CaptureId,
        image: Option<DynamicImage>,
    ) -> Vec<SessionEffect> {
        debug!(%id, success = image.is_some(), "capture completed");
        let mut effects = vec![SessionEffect::DeliverPhoto { id, image }];

        // Whatever stability run led here is consumed.
        self.tracker.reset();

        if self.pending_manual {
            self.pending_manual = false;
            let follow_up = CaptureId::new();
            info!(%follow_up, "starting coalesced manual capture");
            effects.push(SessionEffect::StartCapture {
                id: follow_up,
                observation: None,
            });
        } else {
            self.phase = if self.active {
                CapturePhase::Scanning
            } else {
                CapturePhase::Idle
            };
        }

        effects
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cardlens_core::types::{DetectorSource, Quad};
    use image::{GrayImage, Luma};

    fn session(required: u32) -> CaptureSession {
        let mut s = CaptureSession::new(StabilityConfig {
            corner_tolerance: 0.015,
            required_stable_frames: required,
        });
        s.set_active(true);
        s
    }

    fn observation() -> Observation {
        Observation {
            quad: Quad::axis_aligned(0.2, 0.2, 0.8, 0.8),
            confidence: 0.9,
            source: DetectorSource::Primary,
        }
    }

    fn photo() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 4, Luma([0u8])))
    }

    fn detection_edges(effects: &[SessionEffect]) -> Vec<bool> {
        effects
            .iter()
            .filter_map(|e| match e {
                SessionEffect::NotifyDetection(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    fn capture_starts(effects: &[SessionEffect]) -> Vec<CaptureId> {
        effects
            .iter()
            .filter_map(|e| match e {
                SessionEffect::StartCapture { id, .. } => Some(*id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn detection_flag_fires_only_on_edges() {
        let mut s = session(100);
        let mut edges = Vec::new();

        for result in [
            Some(observation()),
            Some(observation()),
            None,
            None,
            Some(observation()),
        ] {
            edges.extend(detection_edges(&s.handle_frame_result(result)));
        }

        assert_eq!(edges, vec![true, false, true]);
    }

    #[test]
    fn stable_run_triggers_exactly_one_capture() {
        let mut s = session(3);

        let mut started = Vec::new();
        for _ in 0..4 {
            started.extend(capture_starts(&s.handle_frame_result(Some(observation()))));
        }

        assert_eq!(started.len(), 1);
        assert_eq!(s.phase(), CapturePhase::Capturing);

        // Further stable frames cannot start a second capture while one is
        // in flight.
        for _ in 0..10 {
            started.extend(capture_starts(&s.handle_frame_result(Some(observation()))));
        }
        assert_eq!(started.len(), 1);
    }

    #[test]
    fn auto_capture_carries_triggering_observation() {
        let mut s = session(2);
        s.handle_frame_result(Some(observation()));
        s.handle_frame_result(Some(observation()));
        let effects = s.handle_frame_result(Some(observation()));

        match effects
            .iter()
            .find(|e| matches!(e, SessionEffect::StartCapture { .. }))
        {
            Some(SessionEffect::StartCapture { observation, .. }) => {
                assert!(observation.is_some(), "auto-capture must snapshot the quad");
            }
            _ => panic!("expected a StartCapture effect"),
        }
    }

    #[test]
    fn phases_follow_stability() {
        let mut s = session(5);
        assert_eq!(s.phase(), CapturePhase::Scanning);

        s.handle_frame_result(Some(observation()));
        assert_eq!(s.phase(), CapturePhase::Scanning); // first sighting, count 0

        s.handle_frame_result(Some(observation()));
        assert_eq!(s.phase(), CapturePhase::StableCountdown);

        s.handle_frame_result(None);
        assert_eq!(s.phase(), CapturePhase::Scanning);
    }

    #[test]
    fn manual_capture_works_without_observation() {
        let mut s = session(30);
        let effects = s.request_manual_capture();

        match effects.as_slice() {
            [SessionEffect::StartCapture { observation, .. }] => {
                assert!(observation.is_none());
            }
            _ => panic!("expected exactly one StartCapture"),
        }
        assert_eq!(s.phase(), CapturePhase::Capturing);
    }

    #[test]
    fn manual_capture_during_flight_is_coalesced() {
        let mut s = session(30);
        let first = s.request_manual_capture();
        assert_eq!(capture_starts(&first).len(), 1);

        // Second and third requests while busy: coalesced into one.
        assert!(s.request_manual_capture().is_empty());
        assert!(s.request_manual_capture().is_empty());

        let effects = s.complete_capture(capture_starts(&first)[0], Some(photo()));
        let delivered = effects
            .iter()
            .filter(|e| matches!(e, SessionEffect::DeliverPhoto { .. }))
            .count();
        assert_eq!(delivered, 1);
        assert_eq!(capture_starts(&effects).len(), 1);
        assert_eq!(s.phase(), CapturePhase::Capturing);
    }

    #[test]
    fn failed_capture_still_delivers_and_recovers() {
        let mut s = session(30);
        let start = s.request_manual_capture();
        let id = capture_starts(&start)[0];

        let effects = s.complete_capture(id, None);
        match effects.as_slice() {
            [SessionEffect::DeliverPhoto { image, .. }] => assert!(image.is_none()),
            _ => panic!("expected exactly one DeliverPhoto"),
        }
        // Pipeline remains usable.
        assert_eq!(s.phase(), CapturePhase::Scanning);
    }

    #[test]
    fn disabling_during_flight_lets_capture_finish_then_idles() {
        let mut s = session(30);
        let id = capture_starts(&s.request_manual_capture())[0];

        let effects = s.set_active(false);
        assert!(detection_edges(&effects).is_empty());
        assert_eq!(s.phase(), CapturePhase::Capturing);

        let effects = s.complete_capture(id, Some(photo()));
        assert!(
            effects
                .iter()
                .any(|e| matches!(e, SessionEffect::DeliverPhoto { image: Some(_), .. }))
        );
        assert_eq!(s.phase(), CapturePhase::Idle);
    }

    #[test]
    fn disabling_lowers_detection_flag() {
        let mut s = session(30);
        s.handle_frame_result(Some(observation()));
        assert!(s.card_detected());

        let effects = s.set_active(false);
        assert_eq!(detection_edges(&effects), vec![false]);
        assert_eq!(s.phase(), CapturePhase::Idle);

        // Frames arriving while inactive are ignored.
        assert!(s.handle_frame_result(Some(observation())).is_empty());
    }

    #[test]
    fn completed_capture_requires_fresh_stability_run() {
        let mut s = session(2);
        s.handle_frame_result(Some(observation()));
        s.handle_frame_result(Some(observation()));
        let id = capture_starts(&s.handle_frame_result(Some(observation())))[0];

        s.complete_capture(id, Some(photo()));
        assert_eq!(s.phase(), CapturePhase::Scanning);

        // Two more frames only reach count 1: no trigger yet.
        assert!(capture_starts(&s.handle_frame_result(Some(observation()))).is_empty());
        assert!(capture_starts(&s.handle_frame_result(Some(observation()))).is_empty());
        // The third stable comparison completes a fresh run.
        let started = capture_starts(&s.handle_frame_result(Some(observation())));
        assert_eq!(started.len(), 1);
    }
}
