//! Detection loop
//!
//! Runs one cycle per display refresh: pull a frame, paint it, detect the
//! pose, draw the skeleton and log the frame's metrics.

use super::log::PoseLog;
use crate::metrics::{self, MetricSnapshot};
use crate::pose::{DetectionError, PoseSourceAdapter};
use crate::render::{OverlayRenderer, SharedSurface};
use crate::video::VideoSource;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Stopped,
    Running,
}

/// Events emitted by the loop
#[derive(Debug, Clone)]
pub enum DetectionEvent {
    Started,
    Stopped,
    /// The loop hit an unrecoverable detection error and stopped
    Error(String),
}

/// What happened in one processed frame
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// Number of frames processed so far, this one included
    pub frame_index: u64,
    /// Source playback time of the frame
    pub timestamp: f64,
    /// Metrics logged for this frame; `None` when no skeleton was found
    pub snapshot: Option<MetricSnapshot>,
    /// Processed frames per second, smoothed
    pub fps: f64,
}

/// Pose adapter shared between the session and the running loop
pub type SharedPoseSource = Arc<Mutex<PoseSourceAdapter>>;

pub struct DetectionLoop {
    adapter: SharedPoseSource,
    renderer: OverlayRenderer,
    refresh_rate_hz: f64,
    log: PoseLog,
    state: Arc<RwLock<LoopState>>,
    /// Error that ended the last run, held until `stop` reports it
    failure: Arc<parking_lot::Mutex<Option<DetectionError>>>,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
    event_tx: broadcast::Sender<DetectionEvent>,
}

impl DetectionLoop {
    pub fn new(adapter: SharedPoseSource, renderer: OverlayRenderer, refresh_rate_hz: f64) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            adapter,
            renderer,
            refresh_rate_hz,
            log: PoseLog::new(),
            state: Arc::new(RwLock::new(LoopState::Stopped)),
            failure: Arc::new(parking_lot::Mutex::new(None)),
            stop_tx: None,
            task: None,
            event_tx,
        }
    }

    /// Get the current loop state
    pub fn state(&self) -> LoopState {
        *self.state.read()
    }

    /// Check if the loop is processing frames
    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    /// The session's pose log. Clones share the same entries.
    pub fn log(&self) -> PoseLog {
        self.log.clone()
    }

    /// Get the renderer used for every frame
    pub fn renderer(&self) -> &OverlayRenderer {
        &self.renderer
    }

    /// Subscribe to loop events
    pub fn subscribe(&self) -> broadcast::Receiver<DetectionEvent> {
        self.event_tx.subscribe()
    }

    fn refresh_period(&self) -> Duration {
        let hz = if self.refresh_rate_hz.is_finite() && self.refresh_rate_hz > 0.0 {
            self.refresh_rate_hz
        } else {
            60.0
        };
        Duration::from_secs_f64(1.0 / hz)
    }

    /// Start the per-frame cycle. No-op while already running.
    ///
    /// A run that ended on an error may be restarted; that error is still
    /// returned by the next `stop`.
    pub fn start<F>(&mut self, source: Arc<dyn VideoSource>, surface: SharedSurface, on_frame: F)
    where
        F: FnMut(&FrameReport) + Send + 'static,
    {
        if self.is_running() {
            tracing::debug!("Detection loop already running");
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let cycle = Cycle {
            source,
            surface,
            adapter: self.adapter.clone(),
            renderer: self.renderer.clone(),
            log: self.log.clone(),
            period: self.refresh_period(),
        };
        let state = self.state.clone();
        let failure = self.failure.clone();
        let event_tx = self.event_tx.clone();

        *self.state.write() = LoopState::Running;
        let _ = self.event_tx.send(DetectionEvent::Started);
        tracing::info!("Detection loop started");

        self.task = Some(tokio::spawn(async move {
            let event = match cycle.run(stop_rx, on_frame).await {
                Ok(()) => DetectionEvent::Stopped,
                Err(e) => {
                    tracing::error!("Detection loop stopped on error: {}", e);
                    let event = DetectionEvent::Error(e.to_string());
                    let mut slot = failure.lock();
                    if slot.is_none() {
                        *slot = Some(e);
                    }
                    event
                }
            };
            // Record before the state flips to Stopped
            *state.write() = LoopState::Stopped;
            let _ = event_tx.send(event);
        }));
        self.stop_tx = Some(stop_tx);
    }

    /// Halt the cycle and wait for it to wind down. Leaves the log intact.
    ///
    /// Returns the error that ended a run, if one did and that error has
    /// not been returned before. Safe to call when stopped.
    pub async fn stop(&mut self) -> Result<(), DetectionError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(handle) = self.task.take() {
            if let Err(e) = handle.await {
                tracing::error!("Detection task panicked: {}", e);
            }
            *self.state.write() = LoopState::Stopped;
            tracing::info!("Detection loop stopped ({} frames logged)", self.log.len());
        }

        match self.failure.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Everything one running loop needs, moved into its task
struct Cycle {
    source: Arc<dyn VideoSource>,
    surface: SharedSurface,
    adapter: SharedPoseSource,
    renderer: OverlayRenderer,
    log: PoseLog,
    period: Duration,
}

impl Cycle {
    async fn run<F>(self, mut stop_rx: watch::Receiver<bool>, mut on_frame: F) -> Result<(), DetectionError>
    where
        F: FnMut(&FrameReport),
    {
        let _lease = self.surface.lease();
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut frame_index: u64 = 0;
        let mut fps = FpsMeter::new();

        loop {
            tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                _ = ticker.tick() => {}
            }

            let Some(frame) = self.source.next_frame() else {
                continue;
            };

            self.surface.lock().draw_frame(&frame.image);

            let detected = {
                let mut adapter = self.adapter.lock().await;
                adapter.detect_one(&frame).await?
            };

            let time = self.source.current_time();
            let snapshot = match detected {
                Some(keypoints) => {
                    let working = {
                        let mut surface = self.surface.lock();
                        self.renderer.render(&mut surface, &keypoints)
                    };
                    let snapshot = metrics::snapshot(time, &working);
                    self.log.append(snapshot);
                    Some(snapshot)
                }
                None => None,
            };

            frame_index += 1;
            let report = FrameReport {
                frame_index,
                timestamp: time,
                snapshot,
                fps: fps.tick(),
            };
            on_frame(&report);
        }

        Ok(())
    }
}

/// Exponentially smoothed frames-per-second counter
struct FpsMeter {
    last: Option<Instant>,
    fps: f64,
}

impl FpsMeter {
    const SMOOTHING: f64 = 0.1;

    fn new() -> Self {
        Self { last: None, fps: 0.0 }
    }

    fn tick(&mut self) -> f64 {
        let now = Instant::now();
        if let Some(last) = self.last.replace(now) {
            let dt = now.duration_since(last).as_secs_f64();
            if dt > 0.0 {
                let instant = 1.0 / dt;
                self.fps = if self.fps == 0.0 {
                    instant
                } else {
                    self.fps + (instant - self.fps) * Self::SMOOTHING
                };
            }
        }
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{EngineError, InitPolicy, LandmarkEngine, QualityTier, RawLandmark, ReplayEngine};
    use crate::video::{FrameSequence, VideoFrame};
    use async_trait::async_trait;
    use image::RgbaImage;
    use tokio::sync::mpsc;

    fn arm_pose() -> Vec<RawLandmark> {
        let mut landmarks = vec![RawLandmark { x: 0.5, y: 0.5, visibility: 0.0 }; 33];
        landmarks[11] = RawLandmark { x: 0.2, y: 0.2, visibility: 0.9 };
        landmarks[13] = RawLandmark { x: 0.2, y: 0.6, visibility: 0.9 };
        landmarks[15] = RawLandmark { x: 0.6, y: 0.6, visibility: 0.9 };
        landmarks
    }

    fn source(frames: usize) -> Arc<FrameSequence> {
        let images = (0..frames).map(|_| RgbaImage::new(40, 40)).collect();
        Arc::new(FrameSequence::from_images(images, 30.0))
    }

    async fn ready_adapter(engine: Box<dyn LandmarkEngine>) -> SharedPoseSource {
        let mut adapter = PoseSourceAdapter::new(engine, InitPolicy::default());
        adapter.initialize(QualityTier::Balanced).await.unwrap();
        Arc::new(Mutex::new(adapter))
    }

    async fn collect_reports(rx: &mut mpsc::UnboundedReceiver<FrameReport>, n: usize) -> Vec<FrameReport> {
        let mut reports = Vec::new();
        while reports.len() < n {
            let report = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for frames")
                .expect("loop ended early");
            reports.push(report);
        }
        reports
    }

    struct FailingEngine;

    #[async_trait]
    impl LandmarkEngine for FailingEngine {
        async fn load(&mut self, _tier: QualityTier) -> Result<(), EngineError> {
            Ok(())
        }

        async fn detect(
            &mut self,
            _frame: &VideoFrame,
            _timestamp_ms: f64,
        ) -> Result<Vec<Vec<RawLandmark>>, EngineError> {
            Err(EngineError::Fault("model crashed".to_string()))
        }

        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn test_logs_only_frames_with_a_skeleton() {
        let engine = ReplayEngine::new(vec![Some(arm_pose()), None, Some(arm_pose())]);
        let adapter = ready_adapter(Box::new(engine)).await;
        let mut detection = DetectionLoop::new(adapter, OverlayRenderer::default(), 500.0);
        let surface = SharedSurface::new(40, 40);

        let (tx, mut rx) = mpsc::unbounded_channel();
        detection.start(source(3), surface.clone(), move |report| {
            let _ = tx.send(report.clone());
        });
        assert!(detection.is_running());

        let reports = collect_reports(&mut rx, 3).await;
        detection.stop().await.unwrap();

        assert!(reports[0].snapshot.is_some());
        assert!(reports[1].snapshot.is_none());
        assert!(reports[2].snapshot.is_some());
        assert_eq!(reports[2].frame_index, 3);

        let log = detection.log().snapshot();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].angles.elbow_l, Some(90.0));
        assert!(log[0].t <= log[1].t);
        assert!(!surface.is_in_use());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_keeps_log() {
        let engine = ReplayEngine::new(vec![Some(arm_pose())]);
        let adapter = ready_adapter(Box::new(engine)).await;
        let mut detection = DetectionLoop::new(adapter, OverlayRenderer::default(), 500.0);

        detection.stop().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        detection.start(source(1), SharedSurface::new(40, 40), move |report| {
            let _ = tx.send(report.clone());
        });
        collect_reports(&mut rx, 1).await;

        detection.stop().await.unwrap();
        detection.stop().await.unwrap();
        assert_eq!(detection.state(), LoopState::Stopped);
        assert_eq!(detection.log().len(), 1);
    }

    #[tokio::test]
    async fn test_second_start_is_noop() {
        let engine = ReplayEngine::new(vec![Some(arm_pose()); 4]);
        let adapter = ready_adapter(Box::new(engine)).await;
        let mut detection = DetectionLoop::new(adapter, OverlayRenderer::default(), 500.0);
        let frames = source(2);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let tx2 = tx.clone();
        detection.start(frames.clone(), SharedSurface::new(40, 40), move |report| {
            let _ = tx.send(report.frame_index);
        });
        detection.start(frames, SharedSurface::new(40, 40), move |_| {
            let _ = tx2.send(u64::MAX);
        });

        for expected in 1..=2 {
            let index = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(index, expected);
        }
        detection.stop().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_detection_error_stops_loop_and_surfaces() {
        let adapter = ready_adapter(Box::new(FailingEngine)).await;
        let mut detection = DetectionLoop::new(adapter, OverlayRenderer::default(), 500.0);
        let mut events = detection.subscribe();

        detection.start(source(2), SharedSurface::new(40, 40), |_| {});

        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            if let DetectionEvent::Error(message) = event {
                assert!(message.contains("model crashed"));
                break;
            }
        }

        let err = detection.stop().await.unwrap_err();
        assert!(matches!(err, DetectionError::EngineFault(_)));
        assert_eq!(detection.state(), LoopState::Stopped);
        detection.stop().await.unwrap();
        assert!(detection.log().is_empty());
    }

    /// Replays one pose; faults on the first detect and on any timestamp
    /// that does not increase, like a video-mode landmarker
    struct StrictEngine {
        fail_first: bool,
        last_timestamp_ms: Option<f64>,
    }

    impl StrictEngine {
        fn new(fail_first: bool) -> Self {
            Self {
                fail_first,
                last_timestamp_ms: None,
            }
        }
    }

    #[async_trait]
    impl LandmarkEngine for StrictEngine {
        async fn load(&mut self, _tier: QualityTier) -> Result<(), EngineError> {
            Ok(())
        }

        async fn detect(
            &mut self,
            _frame: &VideoFrame,
            timestamp_ms: f64,
        ) -> Result<Vec<Vec<RawLandmark>>, EngineError> {
            if std::mem::take(&mut self.fail_first) {
                return Err(EngineError::Fault("warming up".to_string()));
            }
            if self.last_timestamp_ms.is_some_and(|last| timestamp_ms <= last) {
                return Err(EngineError::Fault("timestamp went backwards".to_string()));
            }
            self.last_timestamp_ms = Some(timestamp_ms);
            Ok(vec![arm_pose()])
        }

        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn test_times_are_logged_in_milliseconds() {
        let engine = ReplayEngine::new(vec![Some(arm_pose())]).looped();
        let adapter = ready_adapter(Box::new(engine)).await;
        let mut detection = DetectionLoop::new(adapter, OverlayRenderer::default(), 500.0);

        let (tx, mut rx) = mpsc::unbounded_channel();
        detection.start(source(10), SharedSurface::new(40, 40), move |report| {
            let _ = tx.send(report.clone());
        });
        let reports = collect_reports(&mut rx, 10).await;
        detection.stop().await.unwrap();

        let times: Vec<f64> = detection.log().snapshot().iter().map(|s| s.t).collect();
        assert_eq!(
            times,
            vec![0.0, 0.033, 0.067, 0.1, 0.133, 0.167, 0.2, 0.233, 0.267, 0.3]
        );
        assert!((reports[3].timestamp - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rewind_does_not_fault_the_engine() {
        let adapter = ready_adapter(Box::new(StrictEngine::new(false))).await;
        let mut detection = DetectionLoop::new(adapter, OverlayRenderer::default(), 500.0);
        let frames = source(2);

        for _ in 0..2 {
            let (tx, mut rx) = mpsc::unbounded_channel();
            detection.start(frames.clone(), SharedSurface::new(40, 40), move |report| {
                let _ = tx.send(report.clone());
            });
            collect_reports(&mut rx, 2).await;
            detection.stop().await.unwrap();
            frames.rewind();
        }

        assert_eq!(detection.log().len(), 4);
        let log = detection.log().snapshot();
        assert!(log.windows(2).all(|w| w[0].t <= w[1].t));
    }

    #[tokio::test]
    async fn test_restart_after_failure_still_reports_it() {
        let adapter = ready_adapter(Box::new(StrictEngine::new(true))).await;
        let mut detection = DetectionLoop::new(adapter, OverlayRenderer::default(), 500.0);
        let mut events = detection.subscribe();

        detection.start(source(1), SharedSurface::new(40, 40), |_| {});
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            if matches!(event, DetectionEvent::Error(_)) {
                break;
            }
        }
        assert_eq!(detection.state(), LoopState::Stopped);

        let (tx, mut rx) = mpsc::unbounded_channel();
        detection.start(source(1), SharedSurface::new(40, 40), move |report| {
            let _ = tx.send(report.clone());
        });
        assert!(detection.is_running());
        collect_reports(&mut rx, 1).await;

        let err = detection.stop().await.unwrap_err();
        assert!(matches!(err, DetectionError::EngineFault(_)));
        detection.stop().await.unwrap();
        assert_eq!(detection.log().len(), 1);
    }
}
