//! Session export module
//!
//! This module packages a finished session (pose log, metrics table and
//! recorded videos) into a single zip archive.

pub mod archive;
pub mod names;
pub mod types;

pub use archive::{export_session, export_session_async, metrics_csv, METRICS_FILE, POSES_FILE};
pub use names::normalize_session_name;
pub use types::{ExportError, FrameSize, PosesDocument, SessionArchive, SessionMeta};
