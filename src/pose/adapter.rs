//! Pose source adapter
//!
//! Wraps an external landmark engine behind an initialize / detect / dispose
//! contract. Engine bootstrap is a single awaited initialization with
//! bounded retry, exponential backoff and a per-attempt timeout.

use super::keypoint::{KeypointSet, RawLandmark};
use crate::video::VideoFrame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Speed/accuracy preset of the pose engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityTier {
    Lightweight,
    Balanced,
    HighAccuracy,
}

impl QualityTier {
    /// Model asset name used by the engine for this tier
    pub fn model_asset(&self) -> &'static str {
        match self {
            QualityTier::Lightweight => "pose_landmarker_lite.task",
            QualityTier::Balanced => "pose_landmarker_full.task",
            QualityTier::HighAccuracy => "pose_landmarker_heavy.task",
        }
    }
}

impl Default for QualityTier {
    fn default() -> Self {
        Self::Balanced
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QualityTier::Lightweight => "lightweight",
            QualityTier::Balanced => "balanced",
            QualityTier::HighAccuracy => "high-accuracy",
        };
        f.write_str(name)
    }
}

/// Errors reported by an engine implementation
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("engine unreachable: {0}")]
    Unreachable(String),

    #[error("quality tier {0} is not supported")]
    UnsupportedTier(QualityTier),

    #[error("engine fault: {0}")]
    Fault(String),
}

/// The pose engine could not be brought up
#[derive(Error, Debug, Clone)]
pub enum InitializationError {
    #[error("pose engine unreachable after {attempts} attempt(s): {reason}")]
    Unreachable { attempts: u32, reason: String },

    #[error("quality tier {0} is not supported by the pose engine")]
    UnsupportedTier(QualityTier),
}

/// Unrecoverable failure while detecting a frame
#[derive(Error, Debug, Clone)]
pub enum DetectionError {
    #[error("pose source is not initialized")]
    NotInitialized,

    #[error("pose engine fault: {0}")]
    EngineFault(String),
}

/// External landmark detector
#[async_trait]
pub trait LandmarkEngine: Send {
    /// Load the model for `tier`. May be called again after `close`.
    async fn load(&mut self, tier: QualityTier) -> Result<(), EngineError>;

    /// Detect poses in a frame. Each pose is a list of normalized landmarks
    /// in canonical order. An empty list means nobody was found.
    async fn detect(
        &mut self,
        frame: &VideoFrame,
        timestamp_ms: f64,
    ) -> Result<Vec<Vec<RawLandmark>>, EngineError>;

    /// Release model resources
    async fn close(&mut self);
}

/// Retry policy for engine bootstrap
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff_ms() -> u64 {
    200
}
fn default_max_backoff_ms() -> u64 {
    3_000
}
fn default_attempt_timeout_ms() -> u64 {
    10_000
}

impl Default for InitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
        }
    }
}

impl InitPolicy {
    /// Backoff before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

/// Owned handle to one pose engine instance
pub struct PoseSourceAdapter {
    engine: Box<dyn LandmarkEngine>,
    policy: InitPolicy,
    tier: Option<QualityTier>,
    /// Last timestamp handed to the engine; engines reject non-increasing ones
    last_timestamp_ms: Option<f64>,
}

impl PoseSourceAdapter {
    pub fn new(engine: Box<dyn LandmarkEngine>, policy: InitPolicy) -> Self {
        Self {
            engine,
            policy,
            tier: None,
            last_timestamp_ms: None,
        }
    }

    /// Tier the engine is currently loaded with
    pub fn tier(&self) -> Option<QualityTier> {
        self.tier
    }

    pub fn is_ready(&self) -> bool {
        self.tier.is_some()
    }

    /// Bring the engine up with `tier`, retrying transient failures.
    ///
    /// Already ready with the same tier is a no-op. Switching tiers releases
    /// the current model first.
    pub async fn initialize(&mut self, tier: QualityTier) -> Result<(), InitializationError> {
        if self.tier == Some(tier) {
            return Ok(());
        }
        if self.tier.is_some() {
            tracing::info!("Switching pose engine tier to {}", tier);
            self.dispose().await;
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut reason = String::new();

        for attempt in 1..=max_attempts {
            tracing::debug!("Loading pose engine ({}), attempt {}/{}", tier, attempt, max_attempts);

            match tokio::time::timeout(self.policy.attempt_timeout(), self.engine.load(tier)).await {
                Ok(Ok(())) => {
                    tracing::info!("Pose engine ready: {} ({})", tier, tier.model_asset());
                    self.tier = Some(tier);
                    return Ok(());
                }
                Ok(Err(EngineError::UnsupportedTier(t))) => {
                    return Err(InitializationError::UnsupportedTier(t));
                }
                Ok(Err(e)) => {
                    tracing::warn!("Pose engine load failed: {}", e);
                    reason = e.to_string();
                }
                Err(_) => {
                    tracing::warn!(
                        "Pose engine load timed out after {}ms",
                        self.policy.attempt_timeout_ms
                    );
                    reason = format!("timed out after {}ms", self.policy.attempt_timeout_ms);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.policy.backoff(attempt)).await;
            }
        }

        Err(InitializationError::Unreachable {
            attempts: max_attempts,
            reason,
        })
    }

    /// Detect at most one skeleton in `frame`, scaled to the frame's pixel space
    pub async fn detect_one(
        &mut self,
        frame: &VideoFrame,
    ) -> Result<Option<KeypointSet>, DetectionError> {
        if self.tier.is_none() {
            return Err(DetectionError::NotInitialized);
        }

        let timestamp_ms = self.next_timestamp_ms(frame.timestamp * 1000.0);
        let poses = self
            .engine
            .detect(frame, timestamp_ms)
            .await
            .map_err(|e| DetectionError::EngineFault(e.to_string()))?;

        let skeleton = poses
            .into_iter()
            .next()
            .filter(|landmarks| !landmarks.is_empty())
            .map(|landmarks| KeypointSet::from_normalized(&landmarks, frame.width(), frame.height()));

        Ok(skeleton)
    }

    /// Strictly increasing engine timestamp. Follows playback time, and
    /// steps 1ms past the previous value after a seek or rewind.
    fn next_timestamp_ms(&mut self, playback_ms: f64) -> f64 {
        let timestamp = match self.last_timestamp_ms {
            Some(last) if playback_ms <= last => last + 1.0,
            _ => playback_ms,
        };
        self.last_timestamp_ms = Some(timestamp);
        timestamp
    }

    /// Release engine resources. Safe to call repeatedly.
    pub async fn dispose(&mut self) {
        if let Some(tier) = self.tier.take() {
            tracing::debug!("Disposing pose engine ({})", tier);
            self.engine.close().await;
        }
    }
}
