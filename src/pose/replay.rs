//! Replay engine
//!
//! A `LandmarkEngine` that plays back previously recorded landmark frames,
//! one entry per detect call. Lets a clip be re-analyzed without a model.

use super::adapter::{EngineError, LandmarkEngine, QualityTier};
use super::keypoint::RawLandmark;
use crate::video::VideoFrame;
use async_trait::async_trait;

pub struct ReplayEngine {
    /// One entry per frame; `None` means no skeleton in that frame
    frames: Vec<Option<Vec<RawLandmark>>>,
    cursor: usize,
    loaded: bool,
    looped: bool,
}

impl ReplayEngine {
    pub fn new(frames: Vec<Option<Vec<RawLandmark>>>) -> Self {
        Self {
            frames,
            cursor: 0,
            loaded: false,
            looped: false,
        }
    }

    /// Parse a JSON array whose entries are landmark lists or `null`
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let frames: Vec<Option<Vec<RawLandmark>>> = serde_json::from_str(json)?;
        Ok(Self::new(frames))
    }

    /// Start over from the first frame once the recording runs out
    pub fn looped(mut self) -> Self {
        self.looped = true;
        self
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait]
impl LandmarkEngine for ReplayEngine {
    async fn load(&mut self, tier: QualityTier) -> Result<(), EngineError> {
        tracing::debug!("Replay engine loaded ({} frames, tier {})", self.frames.len(), tier);
        self.loaded = true;
        self.cursor = 0;
        Ok(())
    }

    async fn detect(
        &mut self,
        _frame: &VideoFrame,
        _timestamp_ms: f64,
    ) -> Result<Vec<Vec<RawLandmark>>, EngineError> {
        if !self.loaded {
            return Err(EngineError::Fault("replay engine not loaded".to_string()));
        }
        if self.looped && self.cursor >= self.frames.len() && !self.frames.is_empty() {
            self.cursor = 0;
        }

        let entry = self.frames.get(self.cursor).cloned().flatten();
        self.cursor += 1;
        Ok(entry.into_iter().collect())
    }

    async fn close(&mut self) {
        self.loaded = false;
    }
}
