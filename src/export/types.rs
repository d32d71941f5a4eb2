//! Export types
//!
//! This module defines the archive documents, the packaged archive and
//! export error handling.

use crate::metrics::MetricSnapshot;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Pixel size of the analysed frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<(u32, u32)> for FrameSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Header of `poses.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    /// ISO-8601 UTC with milliseconds
    pub created_at: String,
    pub width: u32,
    pub height: u32,
}

/// Contents of `poses.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosesDocument {
    pub meta: SessionMeta,
    pub frames: Vec<MetricSnapshot>,
}

/// A packaged session, ready to hand to the user
#[derive(Debug, Clone)]
pub struct SessionArchive {
    /// Normalized session name used for every entry
    pub base_name: String,
    /// `<base_name>.zip`
    pub file_name: String,
    /// Entry names in archive order
    pub entries: Vec<String>,
    pub bytes: Bytes,
}

impl SessionArchive {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the archive into `dir` as `<file_name>`.
    ///
    /// The bytes go to a temp file in the same directory first, so a
    /// partially written archive never appears under the final name.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&self.bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)?;

        tracing::info!("Session archive written to {:?} ({} bytes)", path, self.bytes.len());
        Ok(path)
    }
}

/// Export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Could not persist archive: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Export task failed: {0}")]
    Task(String),
}

impl From<ExportError> for String {
    fn from(e: ExportError) -> String {
        e.to_string()
    }
}
