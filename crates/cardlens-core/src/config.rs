// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Fixed configuration for the single-frame rectangle detector.
///
/// The defaults are tuned for ID cards (ISO/IEC 7810 ID-1 has an aspect
/// ratio of about 1.586) and deliberately strict: a missed frame costs one
/// frame of latency, a false positive costs a bad capture.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Lower bound of the accepted width/height aspect ratio band.
    pub aspect_ratio_min: f32,
    /// Upper bound of the accepted aspect ratio band.
    pub aspect_ratio_max: f32,
    /// Minimum relative size of the card: sqrt(quad area / image area).
    pub min_relative_size: f32,
    /// Minimum detector confidence in [0, 1].
    pub min_confidence: f32,
    /// At most this many candidates are considered per frame.
    pub max_candidates: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            aspect_ratio_min: 1.5,
            aspect_ratio_max: 1.7,
            min_relative_size: 0.2,
            min_confidence: 0.7,
            max_candidates: 1,
        }
    }
}

/// Configuration for the frame-to-frame stability tracker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StabilityConfig {
    /// Per-corner Manhattan tolerance in normalized coordinates. A frame is
    /// stable only if all four corner deltas fall strictly below this.
    pub corner_tolerance: f32,
    /// Consecutive stable frames required before auto-capture fires.
    pub required_stable_frames: u32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            corner_tolerance: 0.015,
            required_stable_frames: 30,
        }
    }
}

/// Top-level pipeline settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub detector: DetectorConfig,
    pub stability: StabilityConfig,
    /// Contrast boost factor applied by the fallback detection pass.
    pub contrast_boost: f32,
    /// Whether the still-capture request enables flash.
    pub flash: bool,
}

impl PipelineConfig {
    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Persist the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), data)?;
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            stability: StabilityConfig::default(),
            contrast_boost: 1.15,
            flash: false,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tuning() {
        let config = PipelineConfig::new();
        assert_eq!(config.detector.aspect_ratio_min, 1.5);
        assert_eq!(config.detector.aspect_ratio_max, 1.7);
        assert_eq!(config.detector.min_relative_size, 0.2);
        assert_eq!(config.detector.min_confidence, 0.7);
        assert_eq!(config.detector.max_candidates, 1);
        assert_eq!(config.stability.corner_tolerance, 0.015);
        assert_eq!(config.stability.required_stable_frames, 30);
        assert_eq!(config.contrast_boost, 1.15);
        assert!(!config.flash);
    }

    #[test]
    fn json_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cardlens.json");

        let mut config = PipelineConfig::new();
        config.stability.required_stable_frames = 12;
        config.save(&path).expect("save");

        let loaded = PipelineConfig::load(&path).expect("load");
        assert_eq!(loaded.stability.required_stable_frames, 12);
        assert_eq!(loaded.contrast_boost, 1.15);
    }
}
