//! Recording system module
//!
//! This module implements the dual stream recording architecture:
//! - MediaBackend/ChunkEncoder traits for the host encoder
//! - DualStreamRecorder to run the overlay and original recorders together
//! - Finalized stream segments handed to export

pub mod channel;
pub mod coordinator;
pub mod state;

pub use channel::{
    extension_for_mime, negotiate_mime, ChunkEncoder, MediaBackend, PngSequenceBackend,
    RecordingError, RecordingResult, PNG_SEQUENCE_MIME, PREFERRED_MIME_TYPES,
};
pub use coordinator::{DualStreamRecorder, RecordingEvent};
pub use state::{RecordingOutput, RecordingState, StreamRole, StreamSegment};
