//! In-memory frame sequence source
//!
//! Plays back a fixed list of frames. Used for offline analysis of decoded
//! clips and as the source in tests.

use super::{CaptureUnavailable, MediaStream, VideoFrame, VideoSource};
use image::RgbaImage;
use parking_lot::Mutex;
use std::sync::Arc;

struct SequenceState {
    frames: Vec<VideoFrame>,
    /// Index of the next frame to hand out
    cursor: usize,
}

impl SequenceState {
    fn current(&self) -> Option<&VideoFrame> {
        self.cursor.checked_sub(1).and_then(|i| self.frames.get(i))
    }
}

/// A finite, in-order sequence of frames
pub struct FrameSequence {
    state: Arc<Mutex<SequenceState>>,
    dimensions: (u32, u32),
    capturable: bool,
    has_audio: bool,
}

impl FrameSequence {
    pub fn new(frames: Vec<VideoFrame>) -> Self {
        let dimensions = frames
            .first()
            .map(|f| (f.width(), f.height()))
            .unwrap_or((0, 0));
        Self {
            state: Arc::new(Mutex::new(SequenceState { frames, cursor: 0 })),
            dimensions,
            capturable: true,
            has_audio: false,
        }
    }

    /// Build a sequence from images played at a fixed frame rate
    pub fn from_images(images: Vec<RgbaImage>, fps: f64) -> Self {
        let step = if fps > 0.0 { 1.0 / fps } else { 0.0 };
        let frames = images
            .into_iter()
            .enumerate()
            .map(|(i, image)| VideoFrame::new(image, i as f64 * step))
            .collect();
        Self::new(frames)
    }

    /// Mark the source as not supporting stream capture
    pub fn without_capture(mut self) -> Self {
        self.capturable = false;
        self
    }

    pub fn with_audio(mut self, has_audio: bool) -> Self {
        self.has_audio = has_audio;
        self
    }

    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every frame has been handed out
    pub fn is_finished(&self) -> bool {
        let state = self.state.lock();
        state.cursor >= state.frames.len()
    }

    /// Restart playback from the first frame
    pub fn rewind(&self) {
        self.state.lock().cursor = 0;
    }
}

impl VideoSource for FrameSequence {
    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn next_frame(&self) -> Option<VideoFrame> {
        let mut state = self.state.lock();
        let frame = state.frames.get(state.cursor).cloned()?;
        state.cursor += 1;
        Some(frame)
    }

    fn current_time(&self) -> f64 {
        self.state.lock().current().map(|f| f.timestamp).unwrap_or(0.0)
    }

    fn capture_stream(&self, include_audio: bool) -> Result<Box<dyn MediaStream>, CaptureUnavailable> {
        if !self.capturable {
            return Err(CaptureUnavailable(
                "source does not support stream capture".to_string(),
            ));
        }
        if include_audio && !self.has_audio {
            tracing::debug!("Source has no audio track, capturing video only");
        }
        Ok(Box::new(SequenceCapture {
            state: self.state.clone(),
        }))
    }
}

/// Capture of a frame sequence: always yields the frame currently on screen
struct SequenceCapture {
    state: Arc<Mutex<SequenceState>>,
}

impl MediaStream for SequenceCapture {
    fn read_frame(&mut self) -> Option<VideoFrame> {
        self.state.lock().current().cloned()
    }
}
