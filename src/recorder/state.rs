//! Recording state management
//!
//! Sub-recorder lifecycle, stream roles and the finalized segments.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one sub-recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// Not recording
    Idle,
    /// Capturing and accumulating chunks
    Active,
    /// Stop requested, flushing the encoder
    Finalizing,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Which stream a sub-recorder captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamRole {
    /// The drawing surface with the skeleton painted on
    Overlay,
    /// The untouched source video
    Original,
}

impl StreamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamRole::Overlay => "overlay",
            StreamRole::Original => "original",
        }
    }
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finished recording: all chunks of one sub-recorder joined together
#[derive(Debug, Clone)]
pub struct StreamSegment {
    pub role: StreamRole,
    pub mime_type: String,
    pub data: Bytes,
    pub chunk_count: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: f64,
}

impl StreamSegment {
    /// File extension matching the segment's format
    pub fn extension(&self) -> &'static str {
        super::channel::extension_for_mime(&self.mime_type)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Result of stopping the dual recorder
#[derive(Debug, Clone, Default)]
pub struct RecordingOutput {
    pub overlay: Option<StreamSegment>,
    pub original: Option<StreamSegment>,
}

impl RecordingOutput {
    pub fn is_empty(&self) -> bool {
        self.overlay.is_none() && self.original.is_none()
    }

    pub fn segments(&self) -> impl Iterator<Item = &StreamSegment> {
        self.overlay.iter().chain(self.original.iter())
    }
}
