//! Error types for media tool invocation.

use std::path::PathBuf;
use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

/// Errors surfaced by the media tool adapter (C1) and the generators built
/// on top of it (C3).
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("ffprobe not found in PATH")]
    FfprobeNotFound,

    #[error("speech-to-text tool not found in PATH")]
    WhisperNotFound,

    #[error("ffmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        /// Last three stderr lines, per §4.1's error-surfacing rule.
        stderr_tail: Vec<String>,
        exit_code: Option<i32>,
    },

    #[error("ffprobe command failed: {message}")]
    ProbeFailed { message: String, stderr: String },

    #[error("speech-to-text invocation failed: {0}")]
    WhisperFailed(String),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0}s")]
    Timeout(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("invalid video: {0}")]
    InvalidVideo(String),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: &str,
        exit_code: Option<i32>,
    ) -> Self {
        let stderr_tail = stderr
            .lines()
            .rev()
            .take(3)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .map(str::to_string)
            .collect();
        Self::FfmpegFailed {
            message: message.into(),
            stderr_tail,
            exit_code,
        }
    }
}
