//! Analysis session
//!
//! Owns one pose adapter, one detection loop, one recorder and one drawing
//! surface. Enforces the ordering between them: detection stops before
//! recording, and export only runs once detection is stopped.

use crate::config::SessionConfig;
use crate::detection::{DetectionEvent, DetectionLoop, FrameReport, PoseLog, SharedPoseSource};
use crate::export::{export_session_async, FrameSize, SessionArchive};
use crate::pose::{DetectionError, LandmarkEngine, PoseSourceAdapter, QualityTier};
use crate::recorder::{DualStreamRecorder, MediaBackend, PngSequenceBackend, RecordingEvent, RecordingOutput};
use crate::render::{OverlayColor, OverlayRenderer, SharedSurface};
use crate::utils::{AppError, AppResult};
use crate::video::VideoSource;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

pub struct Session {
    id: Uuid,
    config: SessionConfig,
    adapter: SharedPoseSource,
    detection: DetectionLoop,
    recorder: DualStreamRecorder,
    surface: SharedSurface,
    /// Output of the last recording, kept until exported or reset
    recording: RecordingOutput,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        engine: Box<dyn LandmarkEngine>,
        backend: Arc<dyn MediaBackend>,
    ) -> Self {
        let adapter: SharedPoseSource =
            Arc::new(Mutex::new(PoseSourceAdapter::new(engine, config.init.clone())));
        let renderer = OverlayRenderer::from_style(&config.overlay);
        let detection = DetectionLoop::new(adapter.clone(), renderer, config.refresh_rate_hz);
        let recorder = DualStreamRecorder::new(backend, config.capture_fps, config.include_audio);
        let id = Uuid::new_v4();

        tracing::info!("Created session {} ({} tier)", id, config.quality_tier);

        Self {
            id,
            config,
            adapter,
            detection,
            recorder,
            surface: SharedSurface::new(0, 0),
            recording: RecordingOutput::default(),
        }
    }

    /// Session recording lossless PNG sequences
    pub fn with_png_backend(config: SessionConfig, engine: Box<dyn LandmarkEngine>) -> Self {
        Self::new(config, engine, Arc::new(PngSequenceBackend))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn surface(&self) -> &SharedSurface {
        &self.surface
    }

    pub fn log(&self) -> PoseLog {
        self.detection.log()
    }

    pub fn is_running(&self) -> bool {
        self.detection.is_running()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Output of the last finished recording
    pub fn recording(&self) -> &RecordingOutput {
        &self.recording
    }

    /// Skeleton color handle; changes apply from the next frame
    pub fn overlay_color(&self) -> OverlayColor {
        self.detection.renderer().color()
    }

    pub fn subscribe_detection(&self) -> broadcast::Receiver<DetectionEvent> {
        self.detection.subscribe()
    }

    pub fn subscribe_recording(&self) -> broadcast::Receiver<RecordingEvent> {
        self.recorder.subscribe()
    }

    /// Start analysing `source`. No-op while already running.
    ///
    /// Loads the pose engine for the configured tier, fits the surface to
    /// the source, then starts detection and (if enabled) recording.
    pub async fn start<F>(&mut self, source: Arc<dyn VideoSource>, on_frame: F) -> AppResult<()>
    where
        F: FnMut(&FrameReport) + Send + 'static,
    {
        if self.detection.is_running() {
            tracing::debug!("Session {} already running", self.id);
            return Ok(());
        }

        // A loop that ended on its own can leave the recorder going
        self.finish_recording().await;

        self.adapter
            .lock()
            .await
            .initialize(self.config.quality_tier)
            .await?;

        let (width, height) = source.dimensions();
        self.surface.resize(width, height)?;

        self.detection.start(source.clone(), self.surface.clone(), on_frame);
        self.recorder.start(&self.surface, source.as_ref(), self.config.record);

        tracing::info!("Session {} started ({}x{})", self.id, width, height);
        Ok(())
    }

    /// Stop detection, then recording. Safe to call repeatedly.
    ///
    /// The recorder is stopped even when detection ended on an error; that
    /// error is returned afterwards.
    pub async fn stop(&mut self) -> Result<RecordingOutput, DetectionError> {
        let detection = self.detection.stop().await;
        let output = self.finish_recording().await;
        tracing::info!("Session {} stopped", self.id);
        detection.map(|()| output)
    }

    async fn finish_recording(&mut self) -> RecordingOutput {
        if !self.recorder.is_recording() {
            return RecordingOutput::default();
        }
        let output = self.recorder.stop().await;
        if !output.is_empty() {
            self.recording = output.clone();
        }
        output
    }

    /// Package the pose log and the last recording.
    ///
    /// Refused while detection runs. Clears the log and the kept
    /// recording once the archive is built.
    pub async fn export(&mut self, name: &str) -> AppResult<SessionArchive> {
        if self.detection.is_running() {
            return Err(AppError::SessionBusy(
                "stop detection before exporting".to_string(),
            ));
        }
        self.finish_recording().await;

        let log = self.detection.log();
        let frame_size = FrameSize::from(self.surface.dimensions());
        let archive = export_session_async(
            log.snapshot(),
            self.recording.clone(),
            name.to_string(),
            frame_size,
        )
        .await?;

        log.clear();
        self.recording = RecordingOutput::default();
        Ok(archive)
    }

    /// Change the pose model. Applies on the next `start`.
    pub fn set_quality_tier(&mut self, tier: QualityTier) -> AppResult<()> {
        if self.detection.is_running() {
            return Err(AppError::SessionBusy(
                "cannot change quality tier while running".to_string(),
            ));
        }
        self.config.quality_tier = tier;
        Ok(())
    }

    /// Drop the logged frames and the kept recording
    pub fn reset(&mut self) -> AppResult<()> {
        if self.detection.is_running() || self.recorder.is_recording() {
            return Err(AppError::SessionBusy("cannot reset while running".to_string()));
        }
        self.detection.log().clear();
        self.recording = RecordingOutput::default();
        tracing::debug!("Session {} reset", self.id);
        Ok(())
    }

    /// Stop everything and release the pose engine
    pub async fn dispose(&mut self) {
        if let Err(e) = self.stop().await {
            tracing::warn!("Session {} ended with detection error: {}", self.id, e);
        }
        self.adapter.lock().await.dispose().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{RawLandmark, ReplayEngine};
    use crate::video::FrameSequence;
    use image::RgbaImage;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn knee_pose() -> Vec<RawLandmark> {
        let mut landmarks = vec![RawLandmark { x: 0.5, y: 0.5, visibility: 0.0 }; 33];
        landmarks[23] = RawLandmark { x: 0.4, y: 0.2, visibility: 0.9 };
        landmarks[25] = RawLandmark { x: 0.4, y: 0.5, visibility: 0.9 };
        landmarks[27] = RawLandmark { x: 0.4, y: 0.8, visibility: 0.9 };
        landmarks
    }

    fn config(record: bool) -> SessionConfig {
        SessionConfig {
            record,
            refresh_rate_hz: 500.0,
            capture_fps: 200,
            ..Default::default()
        }
    }

    fn source(frames: usize) -> Arc<FrameSequence> {
        let images = (0..frames).map(|_| RgbaImage::new(20, 10)).collect();
        Arc::new(FrameSequence::from_images(images, 30.0))
    }

    async fn run_frames(session: &mut Session, frames: usize) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        session
            .start(source(frames), move |report| {
                let _ = tx.send(report.frame_index);
            })
            .await
            .unwrap();
        for _ in 0..frames {
            tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_export_is_refused_while_running() {
        let engine = ReplayEngine::new(vec![Some(knee_pose())]).looped();
        let mut session = Session::with_png_backend(config(false), Box::new(engine));

        run_frames(&mut session, 1).await;
        assert!(session.is_running());
        assert_eq!(session.surface().dimensions(), (20, 10));
        assert!(matches!(
            session.export("run").await,
            Err(AppError::SessionBusy(_))
        ));
        assert!(matches!(
            session.set_quality_tier(QualityTier::Lightweight),
            Err(AppError::SessionBusy(_))
        ));

        session.stop().await.unwrap();
        let archive = session.export("run").await.unwrap();
        assert_eq!(archive.entries, vec!["poses.json", "metrics.csv"]);
        assert!(session.log().is_empty());
    }

    #[tokio::test]
    async fn test_stop_order_and_recording_kept_for_export() {
        let engine = ReplayEngine::new(vec![Some(knee_pose()); 3]);
        let mut session = Session::with_png_backend(config(true), Box::new(engine));

        run_frames(&mut session, 3).await;
        assert!(session.is_recording());

        let output = session.stop().await.unwrap();
        assert!(!session.is_running());
        assert!(!session.is_recording());
        assert!(output.overlay.is_some());
        assert!(output.original.is_some());
        assert!(session.stop().await.unwrap().is_empty());
        assert!(session.recording().overlay.is_some());

        assert_eq!(session.log().len(), 3);
        assert_eq!(session.log().snapshot()[0].angles.knee_l, Some(180.0));

        let archive = session.export("  my run!! ").await.unwrap();
        assert_eq!(archive.file_name, "my_run.zip");
        assert_eq!(archive.entries.len(), 4);
        assert!(archive.entries.contains(&"my_run_overlay.pngs".to_string()));
        assert!(session.recording().is_empty());
    }

    #[tokio::test]
    async fn test_reset_and_tier_change_while_stopped() {
        let engine = ReplayEngine::new(vec![Some(knee_pose())]);
        let mut session = Session::with_png_backend(config(false), Box::new(engine));

        run_frames(&mut session, 1).await;
        session.stop().await.unwrap();
        assert_eq!(session.log().len(), 1);

        session.reset().unwrap();
        assert!(session.log().is_empty());

        session.set_quality_tier(QualityTier::HighAccuracy).unwrap();
        assert_eq!(session.config().quality_tier, QualityTier::HighAccuracy);

        session.dispose().await;
        assert!(!session.adapter.lock().await.is_ready());
    }
}
