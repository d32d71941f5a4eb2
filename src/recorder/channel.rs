//! Media encoding backends
//!
//! A `MediaBackend` is the host's encoder factory (a media recorder). It
//! advertises which container/codec strings it can produce and creates
//! per-stream `ChunkEncoder`s. Format negotiation walks a fixed preference
//! list and falls back to the backend default.

use crate::video::{CaptureUnavailable, VideoFrame};
use bytes::Bytes;
use thiserror::Error;

/// Preferred formats, most compatible first
pub const PREFERRED_MIME_TYPES: [&str; 4] = [
    "video/mp4;codecs=\"avc1.42E01E,mp4a.40.2\"",
    "video/mp4;codecs=h264",
    "video/webm;codecs=vp9",
    "video/webm;codecs=vp8",
];

/// Format produced by the built-in PNG sequence backend
pub const PNG_SEQUENCE_MIME: &str = "video/x-png-sequence";

/// Recording errors
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error(transparent)]
    CaptureUnavailable(#[from] CaptureUnavailable),

    #[error("no preferred encoding is supported")]
    EncodingUnsupported,

    #[error("encoder error: {0}")]
    Encoder(String),

    #[error("recording task failed: {0}")]
    Task(String),
}

pub type RecordingResult<T> = Result<T, RecordingError>;

/// Encodes frames of one stream into binary chunks
pub trait ChunkEncoder: Send {
    /// Format of the produced chunks
    fn mime_type(&self) -> &str;

    /// Encode one frame. May buffer and return nothing.
    fn encode(&mut self, frame: &VideoFrame) -> RecordingResult<Option<Bytes>>;

    /// Flush whatever is buffered
    fn finish(&mut self) -> RecordingResult<Option<Bytes>>;
}

/// Host encoder factory
pub trait MediaBackend: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Format used when no preferred type is supported
    fn default_mime(&self) -> &str;

    /// Create an encoder. `None` asks for the backend default.
    fn create_encoder(&self, mime_type: Option<&str>) -> RecordingResult<Box<dyn ChunkEncoder>>;
}

/// Pick the first preferred format the backend supports
pub fn negotiate_mime(backend: &dyn MediaBackend) -> RecordingResult<String> {
    PREFERRED_MIME_TYPES
        .iter()
        .find(|mime| backend.is_type_supported(mime))
        .map(|mime| mime.to_string())
        .ok_or(RecordingError::EncodingUnsupported)
}

/// File extension for a mime type
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let container = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match container.as_str() {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        PNG_SEQUENCE_MIME => "pngs",
        _ => "bin",
    }
}

/// Lossless fallback backend: every frame becomes one PNG chunk
#[derive(Debug, Default, Clone, Copy)]
pub struct PngSequenceBackend;

impl MediaBackend for PngSequenceBackend {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_type == PNG_SEQUENCE_MIME
    }

    fn default_mime(&self) -> &str {
        PNG_SEQUENCE_MIME
    }

    fn create_encoder(&self, mime_type: Option<&str>) -> RecordingResult<Box<dyn ChunkEncoder>> {
        match mime_type {
            None => Ok(Box::new(PngSequenceEncoder)),
            Some(mime) if self.is_type_supported(mime) => Ok(Box::new(PngSequenceEncoder)),
            Some(mime) => Err(RecordingError::Encoder(format!("unsupported format {}", mime))),
        }
    }
}

struct PngSequenceEncoder;

impl ChunkEncoder for PngSequenceEncoder {
    fn mime_type(&self) -> &str {
        PNG_SEQUENCE_MIME
    }

    fn encode(&mut self, frame: &VideoFrame) -> RecordingResult<Option<Bytes>> {
        let mut buf = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut buf, frame.width(), frame.height());
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder
                .write_header()
                .map_err(|e| RecordingError::Encoder(format!("PNG header error: {}", e)))?;
            writer
                .write_image_data(frame.image.as_raw())
                .map_err(|e| RecordingError::Encoder(format!("PNG frame error: {}", e)))?;
            writer
                .finish()
                .map_err(|e| RecordingError::Encoder(format!("PNG finish error: {}", e)))?;
        }
        Ok(Some(Bytes::from(buf)))
    }

    fn finish(&mut self) -> RecordingResult<Option<Bytes>> {
        Ok(None)
    }
}
