//! Session configuration
//!
//! JSON settings for one analysis session. Every field has a default so a
//! partial (or empty) document is valid.

use crate::pose::{InitPolicy, QualityTier};
use crate::render::{parse_hex_color, OverlayStyle};
use crate::utils::{AppError, AppResult};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Pose model variant
    #[serde(default)]
    pub quality_tier: QualityTier,
    /// Record the overlay and original videos while detecting
    #[serde(default = "default_true")]
    pub record: bool,
    /// Ask for the source's audio track in the original recording
    #[serde(default = "default_true")]
    pub include_audio: bool,
    /// Frame rate of both recordings
    #[serde(default = "default_capture_fps")]
    pub capture_fps: u32,
    /// Detection cadence, normally the display refresh rate
    #[serde(default = "default_refresh_rate_hz")]
    pub refresh_rate_hz: f64,
    #[serde(default)]
    pub overlay: OverlayStyle,
    #[serde(default)]
    pub init: InitPolicy,
}

fn default_true() -> bool {
    true
}

fn default_capture_fps() -> u32 {
    30
}

fn default_refresh_rate_hz() -> f64 {
    60.0
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            quality_tier: QualityTier::default(),
            record: default_true(),
            include_audio: default_true(),
            capture_fps: default_capture_fps(),
            refresh_rate_hz: default_refresh_rate_hz(),
            overlay: OverlayStyle::default(),
            init: InitPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Read and validate a JSON config file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config = Self::from_json(&content)
            .with_context(|| format!("Invalid config {:?}", path))?;
        tracing::debug!("Loaded session config from {:?}", path);
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> AppResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.capture_fps == 0 {
            return Err(AppError::Config("captureFps must be positive".to_string()));
        }
        if !(self.refresh_rate_hz.is_finite() && self.refresh_rate_hz > 0.0) {
            return Err(AppError::Config("refreshRateHz must be positive".to_string()));
        }
        if parse_hex_color(&self.overlay.color).is_none() {
            return Err(AppError::Config(format!(
                "overlay color '{}' is not a hex color",
                self.overlay.color
            )));
        }
        if self.overlay.line_width == 0 {
            return Err(AppError::Config("overlay lineWidth must be positive".to_string()));
        }
        if self.init.max_attempts == 0 {
            return Err(AppError::Config("init maxAttempts must be positive".to_string()));
        }
        Ok(())
    }
}
