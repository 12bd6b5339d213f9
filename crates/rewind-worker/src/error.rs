//! Worker error types (§7 error taxonomy).

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("job failed: {0}")]
    JobFailed(String),

    #[error("video not found: {0}")]
    VideoNotFound(String),

    #[error("spool directory missing or empty: {0}")]
    SpoolInvalid(String),

    #[error("info.json invalid: {0}")]
    InfoJsonInvalid(String),

    #[error("asset generation failed: {0}")]
    AssetFailed(String),

    #[error("advisory lock unavailable for {0}")]
    LockUnavailable(String),

    #[error("media error: {0}")]
    Media(#[from] rewind_media::MediaError),

    #[error("layout error: {0}")]
    Layout(#[from] rewind_layout::LayoutError),

    #[error("db error: {0}")]
    Db(#[from] rewind_db::DbError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn video_not_found(msg: impl Into<String>) -> Self {
        Self::VideoNotFound(msg.into())
    }

    pub fn spool_invalid(msg: impl Into<String>) -> Self {
        Self::SpoolInvalid(msg.into())
    }

    pub fn info_json_invalid(msg: impl Into<String>) -> Self {
        Self::InfoJsonInvalid(msg.into())
    }

    pub fn asset_failed(msg: impl Into<String>) -> Self {
        Self::AssetFailed(msg.into())
    }

    pub fn lock_unavailable(msg: impl Into<String>) -> Self {
        Self::LockUnavailable(msg.into())
    }

    /// Whether this error should count against a job's retry budget, or is
    /// fatal and should fail the job outright (§7: malformed info.json,
    /// missing spool contents never succeed on retry).
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            WorkerError::InfoJsonInvalid(_) | WorkerError::SpoolInvalid(_) | WorkerError::VideoNotFound(_)
        )
    }
}
