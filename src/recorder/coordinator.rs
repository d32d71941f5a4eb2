//! Dual stream recorder
//!
//! Runs the overlay and original sub-recorders as independent tasks that
//! are started and stopped together. Either one may fail to start or to
//! finalize without affecting the other.

use super::channel::{negotiate_mime, ChunkEncoder, MediaBackend, RecordingError, RecordingResult};
use super::state::{RecordingOutput, RecordingState, StreamRole, StreamSegment};
use crate::render::SharedSurface;
use crate::video::{MediaStream, VideoSource};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Events emitted during recording
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// A sub-recorder started with the given format
    Started { role: StreamRole, mime_type: String },
    /// A stream could not be captured; that sub-recorder stays idle
    CaptureUnavailable { role: StreamRole, reason: String },
    /// Both sub-recorders finished
    Stopped,
    /// A sub-recorder failed while recording or finalizing
    Error { role: StreamRole, message: String },
}

/// One capture/encode unit
struct SubRecorder {
    role: StreamRole,
    state: Arc<RwLock<RecordingState>>,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<RecordingResult<StreamSegment>>>,
}

impl SubRecorder {
    fn new(role: StreamRole) -> Self {
        Self {
            role,
            state: Arc::new(RwLock::new(RecordingState::Idle)),
            stop_tx: None,
            task: None,
        }
    }

    fn state(&self) -> RecordingState {
        *self.state.read()
    }

    fn start(&mut self, stream: Box<dyn MediaStream>, encoder: Box<dyn ChunkEncoder>, fps: u32) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let role = self.role;
        let state = self.state.clone();

        *self.state.write() = RecordingState::Active;
        self.task = Some(tokio::spawn(record_stream(role, stream, encoder, fps, stop_rx, state)));
        self.stop_tx = Some(stop_tx);
    }

    /// Ask the task to finalize and wait for its segment
    async fn finish(&mut self) -> RecordingResult<Option<StreamSegment>> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        let Some(handle) = self.task.take() else {
            return Ok(None);
        };

        let result = match handle.await {
            Ok(result) => result.map(Some),
            Err(e) => Err(RecordingError::Task(e.to_string())),
        };
        *self.state.write() = RecordingState::Idle;
        result
    }
}

/// Capture loop of one sub-recorder. Chunks live only inside this task.
async fn record_stream(
    role: StreamRole,
    mut stream: Box<dyn MediaStream>,
    mut encoder: Box<dyn ChunkEncoder>,
    fps: u32,
    mut stop_rx: watch::Receiver<bool>,
    state: Arc<RwLock<RecordingState>>,
) -> RecordingResult<StreamSegment> {
    let started_at = Utc::now();
    let started = Instant::now();
    let mut chunks: Vec<Bytes> = Vec::new();

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / fps.max(1) as f64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut outcome: RecordingResult<()> = Ok(());
    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
        }

        let Some(frame) = stream.read_frame() else {
            continue;
        };
        match encoder.encode(&frame) {
            Ok(Some(chunk)) if !chunk.is_empty() => chunks.push(chunk),
            Ok(_) => {}
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }

    *state.write() = RecordingState::Finalizing;
    drop(stream);
    outcome?;

    if let Some(tail) = encoder.finish()? {
        if !tail.is_empty() {
            chunks.push(tail);
        }
    }

    let chunk_count = chunks.len();
    let mut data = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
    for chunk in &chunks {
        data.extend_from_slice(chunk);
    }

    tracing::debug!("{} recorder finalized: {} chunks, {} bytes", role, chunk_count, data.len());

    Ok(StreamSegment {
        role,
        mime_type: encoder.mime_type().to_string(),
        data: data.freeze(),
        chunk_count,
        started_at,
        duration_ms: started.elapsed().as_secs_f64() * 1000.0,
    })
}

/// Records the overlay surface and the original source side by side
pub struct DualStreamRecorder {
    backend: Arc<dyn MediaBackend>,
    capture_fps: u32,
    include_audio: bool,
    overlay: SubRecorder,
    original: SubRecorder,
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl DualStreamRecorder {
    /// Create an idle recorder writing through `backend`
    pub fn new(backend: Arc<dyn MediaBackend>, capture_fps: u32, include_audio: bool) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            backend,
            capture_fps: capture_fps.max(1),
            include_audio,
            overlay: SubRecorder::new(StreamRole::Overlay),
            original: SubRecorder::new(StreamRole::Original),
            event_tx,
        }
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    /// Get the current state of one sub-recorder
    pub fn state(&self, role: StreamRole) -> RecordingState {
        match role {
            StreamRole::Overlay => self.overlay.state(),
            StreamRole::Original => self.original.state(),
        }
    }

    /// Whether either sub-recorder is running
    pub fn is_recording(&self) -> bool {
        self.overlay.task.is_some() || self.original.task.is_some()
    }

    /// Start both sub-recorders. Does nothing when `enabled` is false or
    /// when already recording. A stream that can't be acquired leaves only
    /// its own sub-recorder idle.
    pub fn start(&mut self, surface: &SharedSurface, source: &dyn VideoSource, enabled: bool) {
        if !enabled {
            tracing::debug!("Recording disabled, recorder stays idle");
            return;
        }
        if self.is_recording() {
            tracing::debug!("Recorder already running");
            return;
        }

        let mime = match negotiate_mime(self.backend.as_ref()) {
            Ok(mime) => Some(mime),
            Err(e) => {
                tracing::debug!("{}, using backend default {}", e, self.backend.default_mime());
                None
            }
        };

        tracing::info!("Recorder start ({} fps)", self.capture_fps);

        let overlay_stream: Box<dyn MediaStream> = Box::new(surface.capture());
        self.start_one(StreamRole::Overlay, Ok(overlay_stream), mime.as_deref());

        let original_stream = source
            .capture_stream(self.include_audio)
            .map_err(RecordingError::from);
        self.start_one(StreamRole::Original, original_stream, mime.as_deref());
    }

    fn start_one(
        &mut self,
        role: StreamRole,
        stream: RecordingResult<Box<dyn MediaStream>>,
        mime: Option<&str>,
    ) {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("{} stream unavailable: {}", role, e);
                let _ = self.event_tx.send(RecordingEvent::CaptureUnavailable {
                    role,
                    reason: e.to_string(),
                });
                return;
            }
        };

        let encoder = match self.backend.create_encoder(mime) {
            Ok(encoder) => encoder,
            Err(e) => {
                tracing::error!("{} recorder init error: {}", role, e);
                let _ = self.event_tx.send(RecordingEvent::Error {
                    role,
                    message: e.to_string(),
                });
                return;
            }
        };

        let mime_type = encoder.mime_type().to_string();
        let fps = self.capture_fps;
        let sub = match role {
            StreamRole::Overlay => &mut self.overlay,
            StreamRole::Original => &mut self.original,
        };
        sub.start(stream, encoder, fps);

        tracing::info!("{} recording started: {}", role, mime_type);
        let _ = self.event_tx.send(RecordingEvent::Started { role, mime_type });
    }

    /// Finalize both sub-recorders and collect their segments.
    ///
    /// Waits for both, even when one fails. A sub-recorder that never
    /// started or failed yields `None`. Safe to call repeatedly.
    pub async fn stop(&mut self) -> RecordingOutput {
        if !self.is_recording() {
            return RecordingOutput::default();
        }

        let (overlay, original) = tokio::join!(self.overlay.finish(), self.original.finish());

        let output = RecordingOutput {
            overlay: self.settle(StreamRole::Overlay, overlay),
            original: self.settle(StreamRole::Original, original),
        };

        let _ = self.event_tx.send(RecordingEvent::Stopped);
        tracing::info!(
            "Recorder stopped (overlay: {}, original: {})",
            output.overlay.as_ref().map(|s| s.len()).unwrap_or(0),
            output.original.as_ref().map(|s| s.len()).unwrap_or(0)
        );
        output
    }

    fn settle(
        &self,
        role: StreamRole,
        result: RecordingResult<Option<StreamSegment>>,
    ) -> Option<StreamSegment> {
        match result {
            Ok(segment) => segment,
            Err(e) => {
                tracing::error!("{} recorder failed: {}", role, e);
                let _ = self.event_tx.send(RecordingEvent::Error {
                    role,
                    message: e.to_string(),
                });
                None
            }
        }
    }
}
