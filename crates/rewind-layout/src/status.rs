//! Asset-status verifier (C4, §4.4): a pure, read-only check of what
//! actually exists on disk for a video's canonical directory.

use std::collections::BTreeMap;
use std::path::Path;

use rewind_models::{AssetsStatus, SeekManifest, WaveformManifest};

/// Verify the canonical directory's contents for `video_id`, producing a
/// fresh `AssetsStatus` (minus the error-tracking bookkeeping, which the
/// caller merges in from the prior status).
pub async fn verify(
    dir: &Path,
    video_id: &str,
    file_hash: Option<&str>,
    seek_manifest: &SeekManifest,
) -> AssetsStatus {
    let video_file = find_by_prefix_suffix(dir, &format!("{video_id}.video."), "")
        .await
        .is_some();

    let thumbnail = verify_thumbnail(dir, video_id).await;
    let preview = dir.join(format!("{video_id}.preview.mp4")).exists();
    let seek = verify_seek_levels(dir, seek_manifest).await;
    let waveform = verify_waveform(dir).await;
    let captions = find_by_prefix_suffix(dir, &format!("{video_id}.captions."), ".vtt")
        .await
        .is_some();
    let hls = dir.join("hls").join("master.m3u8").exists();

    AssetsStatus {
        video_file,
        file_hash: file_hash.is_some(),
        thumbnail,
        preview,
        seek,
        waveform,
        captions,
        hls,
        ..AssetsStatus::default()
    }
}

async fn verify_thumbnail(dir: &Path, video_id: &str) -> bool {
    if !dir.join(format!("{video_id}.thumbnail.jpg")).exists() {
        return false;
    }
    for (label, _) in rewind_media::thumbnails::VARIANTS {
        if !dir.join(format!("{video_id}.thumbnail.{label}.jpg")).exists() {
            return false;
        }
    }
    true
}

async fn verify_seek_levels(dir: &Path, manifest: &SeekManifest) -> BTreeMap<String, bool> {
    let mut out = BTreeMap::new();
    for level in &manifest.levels {
        let level_dir = dir.join("seek").join("levels").join(&level.name);
        let valid = level_dir.join("seek.vtt").exists() && level_dir.join("seek-000.jpg").exists();
        out.insert(level.name.clone(), valid);
    }
    out
}

/// Either the `.no-audio` marker is present, or the manifest matches the
/// expected format and the peaks file is present (§4.4).
async fn verify_waveform(dir: &Path) -> bool {
    let waveform_dir = dir.join("waveform");
    if waveform_dir.join(".no-audio").exists() {
        return true;
    }

    let manifest_path = waveform_dir.join("waveform.json");
    let Ok(bytes) = tokio::fs::read(&manifest_path).await else {
        return false;
    };
    let Ok(manifest) = serde_json::from_slice::<WaveformManifest>(&bytes) else {
        return false;
    };
    if manifest.format != rewind_models::WAVEFORM_MANIFEST_FORMAT {
        return false;
    }
    waveform_dir.join(&manifest.peaks_path).exists()
}

async fn find_by_prefix_suffix(dir: &Path, prefix: &str, suffix: &str) -> Option<std::path::PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let name = name.to_str()?;
        if name.starts_with(prefix) && name.ends_with(suffix) {
            return Some(entry.path());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn video_file_detected_by_prefix() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("v1.video.mp4"), b"x").await.unwrap();
        let manifest = SeekManifest::new(SeekManifest::default_levels());
        let status = verify(tmp.path(), "v1", None, &manifest).await;
        assert!(status.video_file);
        assert!(!status.preview);
    }

    #[tokio::test]
    async fn waveform_no_audio_marker_counts_as_present() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::create_dir_all(tmp.path().join("waveform")).await.unwrap();
        tokio::fs::write(tmp.path().join("waveform").join(".no-audio"), b"")
            .await
            .unwrap();
        let manifest = SeekManifest::new(SeekManifest::default_levels());
        let status = verify(tmp.path(), "v1", None, &manifest).await;
        assert!(status.waveform);
    }

    #[tokio::test]
    async fn seek_levels_require_both_vtt_and_first_sheet() {
        let tmp = TempDir::new().unwrap();
        let manifest = SeekManifest::new(SeekManifest::default_levels());
        let level_dir = tmp.path().join("seek").join("levels").join("coarse");
        tokio::fs::create_dir_all(&level_dir).await.unwrap();
        tokio::fs::write(level_dir.join("seek.vtt"), b"WEBVTT\n").await.unwrap();
        // seek-000.jpg intentionally missing
        let status = verify(tmp.path(), "v1", None, &manifest).await;
        assert_eq!(status.seek.get("coarse"), Some(&false));
    }
}
