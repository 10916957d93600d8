// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Frame stream and still-capture seams to the camera subsystem.

use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, trace, warn};

use cardlens_core::error::Result;
use cardlens_core::types::{CameraAuthorization, CaptureId};

/// One video frame pushed by the capture pipeline.
///
/// The image is shared, never copied per consumer; timestamps are
/// monotonically non-decreasing offsets from stream start.
#[derive(Clone)]
pub struct Frame {
    pub image: Arc<DynamicImage>,
    pub timestamp: Duration,
}

impl Frame {
    pub fn new(image: DynamicImage, timestamp: Duration) -> Self {
        Self {
            image: Arc::new(image),
            timestamp,
        }
    }
}

/// A still-capture request issued to the camera.
///
/// Carries the attempt id so the eventual photo event can be correlated
/// with the request that produced it.
#[derive(Debug, Clone, Copy)]
pub struct StillRequest {
    pub id: CaptureId,
    pub flash: bool,
}

/// Channel on which exactly one capture outcome arrives.
///
/// The one-shot type enforces single-fire semantics: a second send is
/// impossible, and a dropped sender is observed as a capture failure.
pub type StillReceiver = oneshot::Receiver<Result<DynamicImage>>;

/// Asynchronous still-capture primitive provided by the camera subsystem.
pub trait StillCamera: Send + Sync {
    /// Begin capturing a full-resolution still.
    ///
    /// Implementations must eventually resolve the returned channel with
    /// the image or an error; the pipeline keeps at most one request in
    /// flight at a time.
    fn capture_still(&self, request: StillRequest) -> StillReceiver;
}

/// Offer a frame to the pipeline, dropping it if the pipeline is busy.
///
/// Frame producers run at the device frame rate and must never queue a
/// backlog: when the bounded channel is full the frame is discarded and
/// the next one supersedes it. Returns whether the frame was accepted.
pub fn offer_frame(sender: &mpsc::Sender<Frame>, frame: Frame) -> bool {
    match sender.try_send(frame) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(frame)) => {
            trace!(timestamp = ?frame.timestamp, "pipeline busy; frame dropped");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            trace!("pipeline gone; frame dropped");
            false
        }
    }
}

/// Report the camera permission state to the diagnostic log.
///
/// Non-authorized states are not pipeline errors — no frames will arrive
/// and the pipeline simply idles. Call once when the state is known.
pub fn report_authorization(authorization: CameraAuthorization) {
    match authorization {
        CameraAuthorization::Authorized => info!("camera access authorized"),
        CameraAuthorization::NotDetermined => {
            info!("camera access not yet determined; no frames will arrive")
        }
        CameraAuthorization::Denied => {
            warn!("camera access denied; no frames will arrive")
        }
    }
}

// -- Tests --------------------------------------------------------------------
