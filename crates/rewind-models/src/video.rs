//! Video catalog entity.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::AssetsStatus;

/// Unique identifier for an archived video.
///
/// Either a random UUIDv4 (unknown extractor/id) or a deterministic UUIDv5
/// derived from `canonical_domain || info.id` (§4.8), so re-ingesting the
/// same source URL always yields the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub Uuid);

impl VideoId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Deterministic id for a known `(canonical_domain, extractor_id)` pair.
    pub fn deterministic(canonical_domain: &str, extractor_id: &str) -> Self {
        let name = format!("{canonical_domain}{extractor_id}");
        Self(Uuid::new_v5(&NAMESPACE_REWIND, name.as_bytes()))
    }
}

/// Namespace used for all deterministic video identities. An arbitrary,
/// fixed UUID — any value works as long as it never changes between runs.
pub const NAMESPACE_REWIND: Uuid = Uuid::from_bytes([
    0x7e, 0x4f, 0x2a, 0x10, 0x9c, 0x3b, 0x4a, 0x1d, 0x8e, 0x52, 0x6a, 0x9f, 0x01, 0xcb, 0x3d, 0x44,
]);

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A revision record appended on refresh when title/description changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub recorded_at: DateTime<Utc>,
    pub diff: String,
}

/// The catalog row for one archived video.
///
/// Created on first ingest; updated (never duplicated) on refresh. Identity
/// is resolved by the dedup/identity resolver (C8) before this row is
/// written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    /// Canonical source URL, preserved verbatim across refreshes.
    pub src: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub uploader_id: Option<String>,
    pub channel_id: Option<String>,
    pub upload_date: Option<String>,
    pub duration_s: Option<f64>,
    pub view_count: Option<i64>,
    pub like_count: Option<i64>,
    pub info_blob: Value,
    pub comments_blob: Option<Value>,
    pub video_path: Option<String>,
    pub thumbnail_path: Option<String>,
    pub file_hash: Option<String>,
    pub file_size: Option<i64>,
    pub probe_blob: Option<Value>,
    pub assets_status: AssetsStatus,
    pub thumb_gradient_start: Option<String>,
    pub thumb_gradient_end: Option<String>,
    pub thumb_gradient_angle: Option<i32>,
    pub archived_by: String,
    #[serde(default)]
    pub revisions: Vec<Revision>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Video {
    /// Start a fresh row for a brand-new identity.
    pub fn new(id: VideoId, src: impl Into<String>, archived_by: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            src: src.into(),
            title: String::new(),
            description: String::new(),
            tags: Vec::new(),
            uploader_id: None,
            channel_id: None,
            upload_date: None,
            duration_s: None,
            view_count: None,
            like_count: None,
            info_blob: Value::Null,
            comments_blob: None,
            video_path: None,
            thumbnail_path: None,
            file_hash: None,
            file_size: None,
            probe_blob: None,
            assets_status: AssetsStatus::default(),
            thumb_gradient_start: None,
            thumb_gradient_end: None,
            thumb_gradient_angle: None,
            archived_by: archived_by.into(),
            revisions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_id_is_stable_across_calls() {
        let a = VideoId::deterministic("example.test", "abc123");
        let b = VideoId::deterministic("example.test", "abc123");
        assert_eq!(a, b);
    }

    #[test]
    fn deterministic_id_differs_by_extractor_id() {
        let a = VideoId::deterministic("example.test", "abc123");
        let b = VideoId::deterministic("example.test", "xyz789");
        assert_ne!(a, b);
    }

    #[test]
    fn random_ids_are_unique() {
        assert_ne!(VideoId::new(), VideoId::new());
    }
}
