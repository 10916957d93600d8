// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// cardlens-pipeline — Temporal logic of the card capture pipeline.
//
// Ties the per-frame detector to a stability tracker and an explicit
// capture state machine, and drives both from an async frame stream. The
// camera and the UI are external collaborators reached through traits and
// channels; everything in here is testable without either.

pub mod frame;
pub mod runner;
pub mod session;
pub mod stability;

pub use frame::{Frame, StillCamera, StillReceiver, StillRequest, offer_frame, report_authorization};
pub use runner::{PipelineCommand, PipelineEvent, PipelineHandle, PipelineRunner};
pub use session::{CapturePhase, CaptureSession, SessionEffect};
pub use stability::{StabilityOutcome, StabilityTracker};
