//! Session archive builder
//!
//! Packages the pose log and the recorded streams into one zip:
//! - `<name>_overlay.<ext>` / `<name>_original.<ext>` when recorded
//! - `poses.json` with the full per-frame metrics
//! - `metrics.csv` with one row per frame

use super::names::normalize_session_name;
use super::types::{ExportError, FrameSize, PosesDocument, SessionArchive, SessionMeta};
use crate::metrics::{MetricKind, MetricSnapshot};
use crate::recorder::RecordingOutput;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use std::fmt::Write as _;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const POSES_FILE: &str = "poses.json";
pub const METRICS_FILE: &str = "metrics.csv";

/// Build the session archive in memory
pub fn export_session(
    pose_log: &[MetricSnapshot],
    recording: &RecordingOutput,
    session_name: &str,
    frame_size: FrameSize,
) -> Result<SessionArchive, ExportError> {
    let base_name = normalize_session_name(session_name);
    tracing::info!(
        "Exporting session '{}' ({} frames, {} video streams)",
        base_name,
        pose_log.len(),
        recording.segments().count()
    );

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut entries = Vec::new();

    // Already compressed media is stored as-is
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for segment in recording.segments() {
        let name = format!("{}_{}.{}", base_name, segment.role, segment.extension());
        zip.start_file(name.as_str(), stored)?;
        zip.write_all(&segment.data)?;
        tracing::debug!("Added {} ({} bytes)", name, segment.len());
        entries.push(name);
    }

    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let document = poses_document(pose_log, frame_size);
    zip.start_file(POSES_FILE, deflated)?;
    zip.write_all(&serde_json::to_vec_pretty(&document)?)?;
    entries.push(POSES_FILE.to_string());

    zip.start_file(METRICS_FILE, deflated)?;
    zip.write_all(metrics_csv(pose_log).as_bytes())?;
    entries.push(METRICS_FILE.to_string());

    let bytes = zip.finish()?.into_inner();
    tracing::info!("Session archive ready: {} entries, {} bytes", entries.len(), bytes.len());

    Ok(SessionArchive {
        file_name: format!("{}.zip", base_name),
        base_name,
        entries,
        bytes: Bytes::from(bytes),
    })
}

/// Same as [`export_session`], run on the blocking pool
pub async fn export_session_async(
    pose_log: Vec<MetricSnapshot>,
    recording: RecordingOutput,
    session_name: String,
    frame_size: FrameSize,
) -> Result<SessionArchive, ExportError> {
    tokio::task::spawn_blocking(move || {
        export_session(&pose_log, &recording, &session_name, frame_size)
    })
    .await
    .map_err(|e| ExportError::Task(e.to_string()))?
}

fn poses_document(pose_log: &[MetricSnapshot], frame_size: FrameSize) -> PosesDocument {
    PosesDocument {
        meta: SessionMeta {
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            width: frame_size.width,
            height: frame_size.height,
        },
        frames: pose_log.to_vec(),
    }
}

/// Render the metrics table. Missing values are empty fields.
pub fn metrics_csv(pose_log: &[MetricSnapshot]) -> String {
    let mut csv = String::from("t");
    for kind in MetricKind::ALL {
        csv.push(',');
        csv.push_str(kind.column());
    }
    csv.push('\n');

    for snapshot in pose_log {
        let _ = write!(csv, "{}", snapshot.t);
        for value in snapshot.values() {
            csv.push(',');
            if let Some(value) = value {
                let _ = write!(csv, "{}", value);
            }
        }
        csv.push('\n');
    }
    csv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Angles, Areas};
    use crate::recorder::{StreamRole, StreamSegment};
    use std::io::Read;
    use tempfile::tempdir;

    fn snapshot(t: f64, elbow_l: Option<f64>) -> MetricSnapshot {
        MetricSnapshot {
            t,
            angles: Angles {
                elbow_l,
                ..Default::default()
            },
            areas: Areas {
                base_l: Some(1200.5),
                base_r: None,
            },
        }
    }

    fn segment(role: StreamRole, mime: &str, data: &'static [u8]) -> StreamSegment {
        StreamSegment {
            role,
            mime_type: mime.to_string(),
            data: Bytes::from_static(data),
            chunk_count: 1,
            started_at: Utc::now(),
            duration_ms: 40.0,
        }
    }

    fn open(archive: &SessionArchive) -> zip::ZipArchive<Cursor<Vec<u8>>> {
        zip::ZipArchive::new(Cursor::new(archive.bytes.to_vec())).unwrap()
    }

    fn read_entry(archive: &SessionArchive, name: &str) -> String {
        let mut zip = open(archive);
        let mut file = zip.by_name(name).unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        contents
    }

    #[test]
    fn test_csv_has_one_row_per_snapshot() {
        let log = vec![snapshot(0.0, Some(90.0)), snapshot(0.5, None), snapshot(1.0, Some(172.4))];
        let csv = metrics_csv(&log);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "t,elbowL,elbowR,kneeL,kneeR,baseL,baseR");
        assert_eq!(lines[1], "0,90,,,,1200.5,");
        assert_eq!(lines[2], "0.5,,,,,1200.5,");
        for line in &lines {
            assert_eq!(line.split(',').count(), 7);
        }
    }

    #[test]
    fn test_pose_only_export() {
        let log = vec![snapshot(0.0, Some(90.0)), snapshot(0.04, Some(91.5))];
        let archive =
            export_session(&log, &RecordingOutput::default(), "  my run!! ", FrameSize::new(640, 480)).unwrap();

        assert_eq!(archive.file_name, "my_run.zip");
        assert_eq!(archive.entries, vec![POSES_FILE, METRICS_FILE]);
        assert_eq!(open(&archive).len(), 2);

        let poses: serde_json::Value = serde_json::from_str(&read_entry(&archive, POSES_FILE)).unwrap();
        assert_eq!(poses["meta"]["width"], 640);
        assert_eq!(poses["meta"]["height"], 480);
        assert!(poses["meta"]["createdAt"].as_str().unwrap().ends_with('Z'));
        assert_eq!(poses["frames"].as_array().unwrap().len(), 2);
        assert_eq!(poses["frames"][0]["angles"]["elbowL"], 90.0);
        assert!(poses["frames"][0]["angles"]["kneeR"].is_null());
        assert_eq!(poses["frames"][1]["areas"]["baseL"], 1200.5);

        assert_eq!(read_entry(&archive, METRICS_FILE).lines().count(), 3);
    }

    #[test]
    fn test_video_entries_follow_mime_type() {
        let recording = RecordingOutput {
            overlay: Some(segment(StreamRole::Overlay, "video/webm;codecs=vp9", b"overlay")),
            original: Some(segment(StreamRole::Original, "video/quicktime", b"original")),
        };
        let archive = export_session(&[], &recording, "crux", FrameSize::new(10, 10)).unwrap();

        assert_eq!(
            archive.entries,
            vec!["crux_overlay.webm", "crux_original.bin", POSES_FILE, METRICS_FILE]
        );
        assert_eq!(read_entry(&archive, "crux_overlay.webm"), "overlay");
        assert_eq!(read_entry(&archive, METRICS_FILE).lines().count(), 1);
    }

    #[test]
    fn test_write_to_directory() {
        let dir = tempdir().unwrap();
        let archive = export_session(&[], &RecordingOutput::default(), "wall", FrameSize::new(1, 1)).unwrap();

        let path = archive.write_to(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("wall.zip"));
        assert_eq!(std::fs::read(&path).unwrap(), archive.bytes.to_vec());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_async_export() {
        let archive = export_session_async(
            vec![snapshot(0.0, None)],
            RecordingOutput::default(),
            "late session".to_string(),
            FrameSize::new(2, 2),
        )
        .await
        .unwrap();
        assert_eq!(archive.base_name, "late_session");
    }
}
