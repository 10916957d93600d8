// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Async pipeline driver.
//
// One task owns the session state and applies frame results strictly in
// arrival order; detection itself runs on the blocking pool but is awaited
// inline, so the consecutive-counter invariant cannot be corrupted by
// out-of-order application. The frame channel is bounded at depth one:
// producers drop late frames (`offer_frame`) instead of queueing a backlog.

use std::sync::Arc;

use image::DynamicImage;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, instrument, warn};

use cardlens_core::config::PipelineConfig;
use cardlens_core::error::{CardlensError, Result};
use cardlens_core::types::{CaptureId, Observation};
use cardlens_vision::detect::QuadDetector;
use cardlens_vision::still::finalize_still;

use crate::frame::{Frame, StillCamera, StillReceiver, StillRequest};
use crate::session::{CaptureSession, SessionEffect};

/// Bounded depth of the frame channel. Depth one means a producer running
/// ahead of the detector drops frames at the edge rather than queueing.
pub const FRAME_CHANNEL_DEPTH: usize = 1;

/// Control inputs from the external UI collaborator.
#[derive(Debug, Clone, Copy)]
pub enum PipelineCommand {
    /// Enable or disable the whole per-frame pipeline.
    SetActive(bool),
    /// Edge-triggered request for an immediate capture, bypassing the
    /// stability countdown.
    ManualCapture,
    /// Stop the pipeline. An in-flight capture still runs to completion
    /// and its photo is delivered before the task exits.
    Shutdown,
}

/// Outputs to the external UI collaborator. Delivery thread is the
/// consumer's concern; the pipeline only guarantees ordering.
pub enum PipelineEvent {
    /// The card-detected flag changed (edge transitions only).
    CardDetectionChanged(bool),
    /// One capture attempt finished. `None` signals capture or conversion
    /// failure; fired exactly once per accepted request.
    PhotoTaken {
        id: CaptureId,
        image: Option<DynamicImage>,
    },
}

/// Cloneable control handle for a running pipeline.
#[derive(Clone)]
pub struct PipelineHandle {
    commands: mpsc::UnboundedSender<PipelineCommand>,
}

impl PipelineHandle {
    pub fn set_active(&self, active: bool) -> Result<()> {
        self.send(PipelineCommand::SetActive(active))
    }

    pub fn request_capture(&self) -> Result<()> {
        self.send(PipelineCommand::ManualCapture)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(PipelineCommand::Shutdown)
    }

    fn send(&self, command: PipelineCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| CardlensError::ChannelClosed)
    }
}

/// A capture request that has been handed to the camera.
struct InFlightCapture {
    id: CaptureId,
    /// Snapshot of the triggering observation, owned by this request so a
    /// concurrent frame can never overwrite it.
    observation: Option<Observation>,
    receiver: StillReceiver,
}

/// The single owner of the mutable pipeline state.
pub struct PipelineRunner {
    detector: Arc<dyn QuadDetector>,
    camera: Arc<dyn StillCamera>,
    config: PipelineConfig,
    session: CaptureSession,
    frames: mpsc::Receiver<Frame>,
    commands: mpsc::UnboundedReceiver<PipelineCommand>,
    events: mpsc::UnboundedSender<PipelineEvent>,
    in_flight: Option<InFlightCapture>,
}

impl PipelineRunner {
    /// Build a pipeline and its channel endpoints.
    ///
    /// Returns the runner (to be driven via [`PipelineRunner::run`]), the
    /// control handle, the frame inlet for the camera subsystem, and the
    /// event outlet for the UI collaborator.
    pub fn new(
        detector: Arc<dyn QuadDetector>,
        camera: Arc<dyn StillCamera>,
        config: PipelineConfig,
    ) -> (
        Self,
        PipelineHandle,
        mpsc::Sender<Frame>,
        mpsc::UnboundedReceiver<PipelineEvent>,
    ) {
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_DEPTH);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let runner = Self {
            detector,
            camera,
            session: CaptureSession::new(config.stability),
            config,
            frames: frame_rx,
            commands: command_rx,
            events: event_tx,
            in_flight: None,
        };
        let handle = PipelineHandle {
            commands: command_tx,
        };

        (runner, handle, frame_tx, event_rx)
    }

    /// Drive the pipeline until shutdown or until all frame producers and
    /// control handles are gone.
    #[instrument(skip_all)]
    pub async fn run(mut self) {
        info!("capture pipeline started");

        loop {
            let capture_pending = self.in_flight.is_some();

            // Biased polling keeps the ordering deterministic: control
            // signals apply before the frame that arrived with them, and a
            // finished capture is folded in before newer frames.
            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    match command {
                        Some(PipelineCommand::SetActive(active)) => {
                            let effects = self.session.set_active(active);
                            self.apply_effects(effects).await;
                        }
                        Some(PipelineCommand::ManualCapture) => {
                            let effects = self.session.request_manual_capture();
                            self.apply_effects(effects).await;
                        }
                        Some(PipelineCommand::Shutdown) | None => break,
                    }
                }

                outcome = await_still(&mut self.in_flight), if capture_pending => {
                    if let Some(inflight) = self.in_flight.take() {
                        self.finish_capture(inflight.id, inflight.observation, outcome)
                            .await;
                    }
                }

                frame = self.frames.recv() => {
                    match frame {
                        Some(frame) => self.handle_frame(frame).await,
                        // All producers dropped: nothing more to detect.
                        None => break,
                    }
                }
            }
        }

        // An in-flight capture runs to completion even across shutdown.
        if let Some(mut inflight) = self.in_flight.take() {
            info!(id = %inflight.id, "waiting for in-flight capture before shutdown");
            let outcome = (&mut inflight.receiver).await;
            self.finish_capture(inflight.id, inflight.observation, outcome)
                .await;
        }

        info!("capture pipeline stopped");
    }

    /// Run detection for one frame and fold the result into the session.
    async fn handle_frame(&mut self, frame: Frame) {
        if !self.session.is_active() {
            return;
        }

        let detector = Arc::clone(&self.detector);
        let image = Arc::clone(&frame.image);
        let observation =
            match tokio::task::spawn_blocking(move || detector.detect(&image)).await {
                Ok(observation) => observation,
                Err(err) => {
                    // A panicking detector pass counts as a missed frame.
                    warn!(error = %err, "detection task failed; treating as no detection");
                    None
                }
            };

        let effects = self.session.handle_frame_result(observation);
        self.apply_effects(effects).await;
    }

    /// Interpret the effects emitted by a session transition.
    async fn apply_effects(&mut self, effects: Vec<SessionEffect>) {
        for effect in effects {
            match effect {
                SessionEffect::NotifyDetection(detected) => {
                    self.emit(PipelineEvent::CardDetectionChanged(detected));
                }
                SessionEffect::StartCapture { id, observation } => {
                    if self.in_flight.is_some() {
                        // The session never emits this while busy; treat a
                        // violation as a dropped request rather than racing
                        // two captures.
                        warn!(%id, "capture requested while one is in flight; dropped");
                        continue;
                    }
                    let receiver = self.camera.capture_still(StillRequest {
                        id,
                        flash: self.config.flash,
                    });
                    self.in_flight = Some(InFlightCapture {
                        id,
                        observation,
                        receiver,
                    });
                }
                SessionEffect::DeliverPhoto { id, image } => {
                    self.emit(PipelineEvent::PhotoTaken { id, image });
                }
            }
        }
    }

    /// Finalize a completed (or failed) still capture and feed the result
    /// back into the session.
    async fn finish_capture(
        &mut self,
        id: CaptureId,
        observation: Option<Observation>,
        outcome: std::result::Result<Result<DynamicImage>, oneshot::error::RecvError>,
    ) {
        let image = match outcome {
            Ok(Ok(still)) => {
                let detector = Arc::clone(&self.detector);
                let finalized = tokio::task::spawn_blocking(move || {
                    finalize_still(still, observation.as_ref(), detector.as_ref())
                })
                .await;
                match finalized {
                    Ok(image) => Some(image),
                    Err(err) => {
                        warn!(%id, error = %err, "still finalization failed");
                        None
                    }
                }
            }
            Ok(Err(err)) => {
                warn!(%id, error = %err, "still capture failed");
                None
            }
            Err(_) => {
                warn!(%id, "camera dropped the capture request");
                None
            }
        };

        let effects = self.session.complete_capture(id, image);
        self.apply_effects(effects).await;
    }

    fn emit(&self, event: PipelineEvent) {
        // The UI collaborator may have gone away; events are then dropped.
        let _ = self.events.send(event);
    }
}

/// Await the in-flight capture by reference so an unchosen select branch
/// does not lose the request.
async fn await_still(
    slot: &mut Option<InFlightCapture>,
) -> std::result::Result<Result<DynamicImage>, oneshot::error::RecvError> {
    match slot.as_mut() {
        Some(inflight) => (&mut inflight.receiver).await,
        // Guarded by the select precondition; parked forever otherwise.
        None => std::future::pending().await,
    }
}

// -- Tests --------------------------------------------------------------------
