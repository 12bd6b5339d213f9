//! Ingest job definitions for queue processing.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::VideoId;

/// Unique identifier for an ingest job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an ingest job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A single derived-asset category, or all of them.
///
/// Regeneration jobs (§4.6) carry a scope narrowing which generator(s) to
/// (re)run; a normal ingest job always behaves as `All`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetScope {
    All,
    Thumbnail,
    Preview,
    Seek,
    Waveform,
    Captions,
    Hls,
}

impl AssetScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetScope::All => "all",
            AssetScope::Thumbnail => "thumbnail",
            AssetScope::Preview => "preview",
            AssetScope::Seek => "seek",
            AssetScope::Waveform => "waveform",
            AssetScope::Captions => "captions",
            AssetScope::Hls => "hls",
        }
    }

    pub fn includes(&self, other: AssetScope) -> bool {
        matches!(self, AssetScope::All) || *self == other
    }
}

impl fmt::Display for AssetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AssetScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(AssetScope::All),
            "thumbnail" => Ok(AssetScope::Thumbnail),
            "preview" => Ok(AssetScope::Preview),
            "seek" => Ok(AssetScope::Seek),
            "waveform" => Ok(AssetScope::Waveform),
            "captions" => Ok(AssetScope::Captions),
            "hls" => Ok(AssetScope::Hls),
            other => Err(format!("unknown asset scope: {other}")),
        }
    }
}

/// A unit of work pulled from the queue by a worker.
///
/// Owned exclusively by the queue gateway (C5): workers never mutate rows
/// directly, they call back through `MarkSucceeded`/`MarkFailed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestJob {
    pub id: JobId,
    pub download_job_id: String,
    pub video_id: Option<VideoId>,
    pub url: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
    pub info_json_path: Option<String>,
    pub spool_dir: Option<String>,
    #[serde(default)]
    pub asset_scope: Option<AssetScope>,
    #[serde(default)]
    pub refresh: bool,
    pub archived_by: String,
    pub status: JobStatus,
    #[serde(default)]
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

impl IngestJob {
    /// A job is a *regeneration job* when it carries no spool handoff at all.
    pub fn is_regeneration(&self) -> bool {
        self.info_json_path.is_none() && self.spool_dir.is_none()
    }

    /// A format-specific download: `extra_args` names a format selector.
    pub fn is_format_specific(&self) -> bool {
        self.extra_args.windows(2).any(|w| w[0] == "-f")
    }

    pub fn scope(&self) -> AssetScope {
        self.asset_scope.unwrap_or(AssetScope::All)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_roundtrips_through_display() {
        let id = JobId::new();
        let rendered = id.to_string();
        assert_eq!(rendered, id.0.to_string());
    }

    #[test]
    fn regeneration_job_has_no_spool_or_info() {
        let job = IngestJob {
            id: JobId::new(),
            download_job_id: "dl-1".into(),
            video_id: Some(VideoId::new()),
            url: "https://example.test/v/abc123".into(),
            extra_args: vec![],
            info_json_path: None,
            spool_dir: None,
            asset_scope: Some(AssetScope::Seek),
            refresh: false,
            archived_by: "system".into(),
            status: JobStatus::Queued,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
        };
        assert!(job.is_regeneration());
        assert_eq!(job.scope(), AssetScope::Seek);
    }

    #[test]
    fn format_specific_job_detects_dash_f() {
        let job = IngestJob {
            id: JobId::new(),
            download_job_id: "dl-2".into(),
            video_id: Some(VideoId::new()),
            url: "https://example.test/v/abc123".into(),
            extra_args: vec!["-f".into(), "137".into()],
            info_json_path: Some("/spool/x/info.json".into()),
            spool_dir: Some("/spool/x".into()),
            asset_scope: None,
            refresh: false,
            archived_by: "system".into(),
            status: JobStatus::Queued,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
        };
        assert!(job.is_format_specific());
        assert!(!job.is_regeneration());
        assert_eq!(job.scope(), AssetScope::All);
    }

    #[test]
    fn job_status_round_trips_through_str() {
        for s in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Succeeded,
            JobStatus::Failed,
        ] {
            assert_eq!(s.as_str().parse::<JobStatus>().unwrap(), s);
        }
    }
}
