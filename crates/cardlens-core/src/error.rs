// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Cardlens.

use thiserror::Error;

/// Top-level error type for all Cardlens operations.
#[derive(Debug, Error)]
pub enum CardlensError {
    // -- Detection errors --
    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("perspective transform failed: {0}")]
    Transform(String),

    // -- Capture errors --
    #[error("still capture failed: {0}")]
    Capture(String),

    #[error("a still capture is already in flight")]
    CaptureBusy,

    #[error("camera access denied")]
    CameraDenied,

    // -- Pipeline plumbing --
    #[error("pipeline channel closed")]
    ChannelClosed,

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CardlensError>;
