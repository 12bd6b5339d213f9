//! Asset-status bookkeeping (§3 `AssetsStatus`, §4.4).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Truthful record of what derived assets exist on disk for one video,
/// recomputed at the end of every ingest or catchup unit (§3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsStatus {
    pub video_file: bool,
    pub file_hash: bool,
    pub thumbnail: bool,
    pub preview: bool,
    pub seek: BTreeMap<String, bool>,
    pub waveform: bool,
    pub captions: bool,
    pub hls: bool,

    #[serde(rename = "_error_count", default)]
    pub error_count: u32,
    #[serde(rename = "_last_error_at", default)]
    pub last_error_at: Option<DateTime<Utc>>,
    #[serde(rename = "_errors", default)]
    pub errors: BTreeMap<String, String>,
}

impl Default for AssetsStatus {
    fn default() -> Self {
        Self {
            video_file: false,
            file_hash: false,
            thumbnail: false,
            preview: false,
            seek: BTreeMap::new(),
            waveform: false,
            captions: false,
            hls: false,
            error_count: 0,
            last_error_at: None,
            errors: BTreeMap::new(),
        }
    }
}

impl AssetsStatus {
    /// True when every asset the video is expected to have is present.
    /// `seek` is only considered complete if it has at least the default
    /// levels populated.
    pub fn is_complete(&self, expected_seek_levels: &[&str]) -> bool {
        self.video_file
            && self.file_hash
            && self.thumbnail
            && self.preview
            && self.waveform
            && self.captions
            && expected_seek_levels
                .iter()
                .all(|lvl| self.seek.get(*lvl).copied().unwrap_or(false))
    }

    /// Merge fresh per-asset verifier output with this row's prior error
    /// bookkeeping (§4.4: "the caller merges `_error_count`/... from prior
    /// status"). Call with the verifier's boolean fields already applied.
    pub fn record_error(&mut self, asset: &str, message: impl Into<String>) {
        self.errors.insert(asset.to_string(), message.into());
        self.error_count += 1;
        self.last_error_at = Some(Utc::now());
    }

    pub fn clear_error(&mut self, asset: &str) {
        self.errors.remove(asset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_complete_checks_expected_seek_levels() {
        let mut status = AssetsStatus {
            video_file: true,
            file_hash: true,
            thumbnail: true,
            preview: true,
            waveform: true,
            captions: true,
            ..Default::default()
        };
        assert!(!status.is_complete(&["coarse", "medium", "fine"]));
        status.seek.insert("coarse".into(), true);
        status.seek.insert("medium".into(), true);
        status.seek.insert("fine".into(), true);
        assert!(status.is_complete(&["coarse", "medium", "fine"]));
    }

    #[test]
    fn record_error_increments_counter() {
        let mut status = AssetsStatus::default();
        status.record_error("waveform", "ffmpeg exited 1");
        assert_eq!(status.error_count, 1);
        assert!(status.last_error_at.is_some());
        assert_eq!(status.errors.get("waveform").unwrap(), "ffmpeg exited 1");
    }
}
