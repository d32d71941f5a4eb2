//! Video source boundary
//!
//! A `VideoSource` hands decoded frames to the detection loop and can be
//! captured as an independent `MediaStream` for recording.

pub mod sequence;

pub use sequence::FrameSequence;

use image::RgbaImage;
use std::sync::Arc;
use thiserror::Error;

/// A decoded frame and its playback time in seconds
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub image: Arc<RgbaImage>,
    pub timestamp: f64,
}

impl VideoFrame {
    pub fn new(image: RgbaImage, timestamp: f64) -> Self {
        Self {
            image: Arc::new(image),
            timestamp,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A media stream could not be acquired from a source
#[derive(Error, Debug, Clone)]
#[error("capture unavailable: {0}")]
pub struct CaptureUnavailable(pub String);

/// Pull-based stream of frames, polled at the capture rate
pub trait MediaStream: Send {
    /// Current frame of the stream, if one is available
    fn read_frame(&mut self) -> Option<VideoFrame>;
}

/// A playable video or live camera
pub trait VideoSource: Send + Sync {
    /// Frame dimensions in pixels
    fn dimensions(&self) -> (u32, u32);

    /// Next decodable frame not yet handed out, or `None` when nothing new is ready
    fn next_frame(&self) -> Option<VideoFrame>;

    /// Current playback time in seconds
    fn current_time(&self) -> f64;

    /// Open an independent capture of this source for recording
    fn capture_stream(&self, include_audio: bool) -> Result<Box<dyn MediaStream>, CaptureUnavailable>;
}
