//! Error types and handling
//!
//! Application-wide error type wrapping the per-subsystem errors.

use crate::export::ExportError;
use crate::pose::{DetectionError, InitializationError};
use crate::recorder::RecordingError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Initialization error: {0}")]
    Initialization(#[from] InitializationError),

    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Surface busy: {0}")]
    SurfaceBusy(String),

    #[error("Session busy: {0}")]
    SessionBusy(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error payload for host applications
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Initialization(_) => "INITIALIZATION_ERROR",
            AppError::Detection(_) => "DETECTION_ERROR",
            AppError::Recording(_) => "RECORDING_ERROR",
            AppError::Export(_) => "EXPORT_ERROR",
            AppError::SurfaceBusy(_) => "SURFACE_BUSY",
            AppError::SessionBusy(_) => "SESSION_BUSY",
            AppError::Config(_) => "CONFIG_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
