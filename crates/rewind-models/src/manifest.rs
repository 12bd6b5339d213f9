//! On-disk manifest formats written alongside derived assets (§3, §6).

use serde::{Deserialize, Serialize};

pub const SEEK_MANIFEST_FORMAT: &str = "rewind-seek-v1";
pub const WAVEFORM_MANIFEST_FORMAT: &str = "rewind-waveform-v1";

/// One seek-sprite resolution tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeekLevel {
    pub name: String,
    pub interval_seconds: f64,
    pub thumb_width: u32,
    pub thumb_height: u32,
    pub cols: u32,
    pub rows: u32,
    pub vtt_path: String,
}

impl SeekLevel {
    /// Thumbnails per sprite sheet.
    pub fn tile_capacity(&self) -> u32 {
        self.cols * self.rows
    }
}

/// `seek/seek.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeekManifest {
    pub format: String,
    pub levels: Vec<SeekLevel>,
}

impl SeekManifest {
    pub fn new(levels: Vec<SeekLevel>) -> Self {
        Self {
            format: SEEK_MANIFEST_FORMAT.to_string(),
            levels,
        }
    }

    /// The three always-on levels, per §3.
    pub fn default_levels() -> Vec<SeekLevel> {
        vec![
            SeekLevel {
                name: "coarse".into(),
                interval_seconds: 30.0,
                thumb_width: 96,
                thumb_height: 54,
                cols: 12,
                rows: 10,
                vtt_path: "levels/coarse/seek.vtt".into(),
            },
            SeekLevel {
                name: "medium".into(),
                interval_seconds: 10.0,
                thumb_width: 160,
                thumb_height: 90,
                cols: 10,
                rows: 10,
                vtt_path: "levels/medium/seek.vtt".into(),
            },
            SeekLevel {
                name: "fine".into(),
                interval_seconds: 1.0,
                thumb_width: 160,
                thumb_height: 90,
                cols: 10,
                rows: 10,
                vtt_path: "levels/fine/seek.vtt".into(),
            },
        ]
    }

    /// Optional extra-fine levels, gated by `SEEK_ENABLE_X{,X,XXX}FINE`.
    pub fn optional_levels() -> Vec<SeekLevel> {
        vec![
            SeekLevel {
                name: "x-fine".into(),
                interval_seconds: 0.5,
                thumb_width: 160,
                thumb_height: 90,
                cols: 10,
                rows: 10,
                vtt_path: "levels/x-fine/seek.vtt".into(),
            },
            SeekLevel {
                name: "xx-fine".into(),
                interval_seconds: 0.25,
                thumb_width: 160,
                thumb_height: 90,
                cols: 10,
                rows: 10,
                vtt_path: "levels/xx-fine/seek.vtt".into(),
            },
            SeekLevel {
                name: "xxx-fine".into(),
                interval_seconds: 0.1,
                thumb_width: 160,
                thumb_height: 90,
                cols: 10,
                rows: 10,
                vtt_path: "levels/xxx-fine/seek.vtt".into(),
            },
        ]
    }

    /// Level names must match `^[a-z0-9_-]+$` (§3).
    pub fn is_valid_level_name(name: &str) -> bool {
        !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    }
}

/// `waveform/waveform.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveformManifest {
    pub format: String,
    pub bucket_ms: u32,
    pub sample_rate_hz: u32,
    pub channels: u32,
    pub duration_seconds: f64,
    pub peaks_path: String,
}

impl WaveformManifest {
    pub fn new(duration_seconds: f64) -> Self {
        Self {
            format: WAVEFORM_MANIFEST_FORMAT.to_string(),
            bucket_ms: 100,
            sample_rate_hz: 8000,
            channels: 1,
            duration_seconds,
            peaks_path: "peaks.i16".to_string(),
        }
    }

    pub fn samples_per_bucket(&self) -> u64 {
        (self.sample_rate_hz as u64 * self.bucket_ms as u64) / 1000
    }

    /// Expected `peaks.i16` size in bytes (property 6).
    pub fn expected_peaks_bytes(&self, total_samples: u64) -> u64 {
        let per_bucket = self.samples_per_bucket().max(1);
        let buckets = total_samples.div_ceil(per_bucket);
        buckets * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_name_validation() {
        assert!(SeekManifest::is_valid_level_name("coarse"));
        assert!(SeekManifest::is_valid_level_name("x-fine"));
        assert!(SeekManifest::is_valid_level_name("xxx_fine-2"));
        assert!(!SeekManifest::is_valid_level_name("Coarse"));
        assert!(!SeekManifest::is_valid_level_name("coarse!"));
        assert!(!SeekManifest::is_valid_level_name(""));
    }

    #[test]
    fn tile_capacity_is_cols_times_rows() {
        let level = &SeekManifest::default_levels()[0];
        assert_eq!(level.tile_capacity(), 120);
    }

    #[test]
    fn waveform_expected_peaks_bytes_matches_property_6() {
        let manifest = WaveformManifest::new(1.0);
        // 8000 Hz, 100ms buckets -> 800 samples/bucket.
        assert_eq!(manifest.samples_per_bucket(), 800);
        assert_eq!(manifest.expected_peaks_bytes(800), 2);
        assert_eq!(manifest.expected_peaks_bytes(801), 4);
        assert_eq!(manifest.expected_peaks_bytes(0), 0);
    }
}
