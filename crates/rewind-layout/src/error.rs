//! Error types for canonical layout management and status verification.

use std::path::PathBuf;
use thiserror::Error;

pub type LayoutResult<T> = Result<T, LayoutError>;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("spool directory not found: {0}")]
    SpoolNotFound(PathBuf),

    #[error("no candidate video file found in spool {0}")]
    NoVideoInSpool(PathBuf),

    #[error("canonical directory already exists and is not a directory: {0}")]
    CanonicalPathConflict(PathBuf),

    #[error("media error: {0}")]
    Media(#[from] rewind_media::MediaError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid info.json at {path}: {message}")]
    InvalidInfoJson { path: PathBuf, message: String },
}

impl LayoutError {
    pub fn invalid_info_json(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidInfoJson {
            path: path.into(),
            message: message.into(),
        }
    }
}
