// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cardlens replay tool.
//
// Feeds a still image through the live capture pipeline as if it were a
// camera frame stream, then writes the rectified capture to disk. Useful
// for tuning detection parameters against recorded material without a
// device. `--manual` skips the stability countdown and exercises the
// post-hoc detection path instead.

use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use tokio::sync::oneshot;
use tracing::{info, warn};

use cardlens_core::config::PipelineConfig;
use cardlens_core::error::{CardlensError, Result};
use cardlens_core::types::CameraAuthorization;
use cardlens_pipeline::{
    Frame, PipelineEvent, PipelineRunner, StillCamera, StillReceiver, StillRequest,
    report_authorization,
};
use cardlens_vision::CardDetector;

/// Camera double that answers every still request with the replayed image.
struct ReplayCamera {
    image: DynamicImage,
}

impl StillCamera for ReplayCamera {
    fn capture_still(&self, request: StillRequest) -> StillReceiver {
        info!(id = %request.id, flash = request.flash, "replay camera captured still");
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Ok(self.image.clone()));
        rx
    }
}

fn usage() -> ! {
    eprintln!("usage: cardlens-replay <input-image> [output-image] [--manual]");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut input = None;
    let mut output = None;
    let mut manual = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--manual" => manual = true,
            "--help" | "-h" => usage(),
            _ if input.is_none() => input = Some(arg),
            _ if output.is_none() => output = Some(arg),
            _ => usage(),
        }
    }
    let Some(input) = input else { usage() };
    let output = output.unwrap_or_else(|| "cardlens-capture.png".to_string());

    let image = image::open(&input)
        .map_err(|err| CardlensError::ImageError(format!("failed to open {input}: {err}")))?;
    info!(
        input,
        width = image.width(),
        height = image.height(),
        "replay image loaded"
    );

    // A replayed file is always "authorized".
    report_authorization(CameraAuthorization::Authorized);

    let config = PipelineConfig::new();
    let stable_frames = config.stability.required_stable_frames;
    let detector = Arc::new(CardDetector::new(&config));
    let camera = Arc::new(ReplayCamera {
        image: image.clone(),
    });

    let (runner, handle, frames, mut events) = PipelineRunner::new(detector, camera, config);
    let pipeline = tokio::spawn(runner.run());

    if manual {
        info!("manual capture requested; bypassing stability countdown");
        handle.request_capture()?;
    } else {
        handle.set_active(true)?;
        // One first sighting plus a full stable run triggers auto-capture.
        for i in 0..=stable_frames as u64 {
            let frame = Frame::new(image.clone(), Duration::from_millis(i * 33));
            frames
                .send(frame)
                .await
                .map_err(|_| CardlensError::ChannelClosed)?;
        }
    }

    // Closing the frame inlet winds the pipeline down; an in-flight
    // capture still completes and delivers.
    drop(frames);
    pipeline
        .await
        .map_err(|err| CardlensError::Capture(format!("pipeline task failed: {err}")))?;

    let mut photo = None;
    while let Ok(event) = events.try_recv() {
        match event {
            PipelineEvent::CardDetectionChanged(detected) => {
                info!(detected, "card detection changed");
            }
            PipelineEvent::PhotoTaken { id, image } => {
                info!(%id, success = image.is_some(), "photo taken");
                photo = image;
            }
        }
    }

    match photo {
        Some(photo) => {
            photo
                .save(&output)
                .map_err(|err| CardlensError::ImageError(format!("failed to save {output}: {err}")))?;
            info!(
                output,
                width = photo.width(),
                height = photo.height(),
                "capture written"
            );
            Ok(())
        }
        None => {
            warn!("no capture produced; try --manual to bypass the stability countdown");
            std::process::exit(1);
        }
    }
}
