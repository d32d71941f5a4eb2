use boulder_skeleton::detection::FrameReport;
use boulder_skeleton::pose::ReplayEngine;
use boulder_skeleton::recorder::RecordingEvent;
use boulder_skeleton::video::FrameSequence;
use boulder_skeleton::{Session, SessionConfig};
use image::RgbaImage;
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc;

/// Landmarks for a climber with a bent left arm and a straight left leg
fn landmark_json(frames: usize) -> String {
    let mut pose = vec![serde_json::json!({ "x": 0.5, "y": 0.5, "visibility": 0.0 }); 33];
    pose[11] = serde_json::json!({ "x": 0.25, "y": 0.25, "visibility": 0.95 });
    pose[13] = serde_json::json!({ "x": 0.25, "y": 0.5, "visibility": 0.95 });
    pose[15] = serde_json::json!({ "x": 0.5, "y": 0.5, "visibility": 0.95 });
    pose[23] = serde_json::json!({ "x": 0.5, "y": 0.25 });
    pose[25] = serde_json::json!({ "x": 0.5, "y": 0.5 });
    pose[27] = serde_json::json!({ "x": 0.5, "y": 0.75 });

    let mut entries: Vec<serde_json::Value> = (0..frames).map(|_| serde_json::json!(pose)).collect();
    entries[1] = serde_json::Value::Null;
    serde_json::to_string(&entries).unwrap()
}

fn clip(frames: usize) -> FrameSequence {
    let images = (0..frames).map(|_| RgbaImage::new(64, 48)).collect();
    FrameSequence::from_images(images, 25.0)
}

fn test_config() -> SessionConfig {
    SessionConfig::from_json(
        r##"{
            "qualityTier": "lightweight",
            "record": true,
            "includeAudio": true,
            "captureFps": 200,
            "refreshRateHz": 500,
            "overlay": { "color": "#FF0000" },
            "init": { "maxAttempts": 2, "initialBackoffMs": 1 }
        }"##,
    )
    .unwrap()
}

async fn run_clip(session: &mut Session, source: Arc<FrameSequence>, frames: usize) -> Vec<FrameReport> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    session
        .start(source, move |report| {
            let _ = tx.send(report.clone());
        })
        .await
        .unwrap();

    let mut reports = Vec::new();
    while reports.len() < frames {
        let report = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("frames should keep coming")
            .unwrap();
        reports.push(report);
    }
    reports
}

#[tokio::test]
async fn test_full_session_to_archive_on_disk() {
    let engine = ReplayEngine::from_json(&landmark_json(4)).unwrap();
    let mut session = Session::with_png_backend(test_config(), Box::new(engine));

    let reports = run_clip(&mut session, Arc::new(clip(4)), 4).await;
    assert!(reports[1].snapshot.is_none());
    assert_eq!(reports[0].snapshot.unwrap().angles.elbow_l, Some(90.0));
    assert_eq!(reports[0].snapshot.unwrap().angles.knee_l, Some(180.0));

    session.stop().await.unwrap();
    assert_eq!(session.log().len(), 3);

    let archive = session.export("Moonboard  6B+").await.unwrap();
    assert_eq!(archive.base_name, "Moonboard_6B");
    assert_eq!(
        archive.entries,
        vec![
            "Moonboard_6B_overlay.pngs",
            "Moonboard_6B_original.pngs",
            "poses.json",
            "metrics.csv"
        ]
    );

    let dir = tempdir().unwrap();
    let path = archive.write_to(dir.path()).unwrap();
    let mut zip = zip::ZipArchive::new(Cursor::new(std::fs::read(path).unwrap())).unwrap();

    let mut csv = String::new();
    zip.by_name("metrics.csv").unwrap().read_to_string(&mut csv).unwrap();
    let rows: Vec<&str> = csv.lines().collect();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0], "t,elbowL,elbowR,kneeL,kneeR,baseL,baseR");
    assert!(rows[1].starts_with("0,90,,180,"));

    let mut poses = String::new();
    zip.by_name("poses.json").unwrap().read_to_string(&mut poses).unwrap();
    let poses: serde_json::Value = serde_json::from_str(&poses).unwrap();
    assert_eq!(poses["meta"]["width"], 64);
    assert_eq!(poses["meta"]["height"], 48);

    let times: Vec<f64> = poses["frames"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["t"].as_f64().unwrap())
        .collect();
    assert_eq!(times.len(), 3);
    assert!(times.windows(2).all(|w| w[0] <= w[1]));

    assert!(session.log().is_empty());
}

#[tokio::test]
async fn test_uncapturable_source_still_records_overlay() {
    let engine = ReplayEngine::from_json(&landmark_json(3)).unwrap();
    let mut session = Session::with_png_backend(test_config(), Box::new(engine));
    let mut events = session.subscribe_recording();

    run_clip(&mut session, Arc::new(clip(3).without_capture()), 3).await;
    let output = session.stop().await.unwrap();

    assert!(output.overlay.is_some());
    assert!(output.original.is_none());

    let mut unavailable = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, RecordingEvent::CaptureUnavailable { .. }) {
            unavailable = true;
        }
    }
    assert!(unavailable);

    let archive = session.export("").await.unwrap();
    assert!(archive.base_name.starts_with("session_"));
    assert_eq!(archive.entries.len(), 3);
}

#[tokio::test]
async fn test_overlay_color_changes_apply_to_next_frames() {
    let engine = ReplayEngine::from_json(&landmark_json(2)).unwrap().looped();
    let mut config = test_config();
    config.record = false;
    let mut session = Session::with_png_backend(config, Box::new(engine));

    let color = session.overlay_color();
    assert_eq!(color.get().0, [0xFF, 0x00, 0x00, 0xFF]);
    assert!(color.set_hex("#00FF00"));
    assert!(!color.set_hex("green"));

    run_clip(&mut session, Arc::new(clip(1)), 1).await;
    session.stop().await.unwrap();
    assert!(!session.is_recording());

    // Upper arm from shoulder (16,12) to elbow (16,24)
    let pixel = *session.surface().snapshot().get_pixel(16, 18);
    assert_eq!(pixel.0, [0x00, 0xFF, 0x00, 0xFF]);
}
