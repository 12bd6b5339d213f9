//! Canonical on-disk asset directory: creation, spool placement, hashing,
//! and legacy migration (§4.2).

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use rewind_media::fs_utils::move_file;
use rewind_media::{FfmpegCommand, FfmpegRunner};

use crate::error::{LayoutError, LayoutResult};
use crate::spool::{scan_spool, vtt_language_tag};

#[cfg(unix)]
const DIR_MODE: u32 = 0o755;

/// Result of placing a freshly-scanned spool into the canonical directory.
#[derive(Debug, Clone)]
pub struct CanonicalPlacement {
    pub video_path: PathBuf,
    pub thumbnail_path: Option<PathBuf>,
    pub file_hash: String,
    pub file_size: u64,
}

pub fn canonical_dir(downloads_dir: &Path, video_id: &str) -> PathBuf {
    downloads_dir.join(video_id)
}

/// Ensure `<downloads>/<video_id>/` exists with mode 0755 (§4.2 rule 1).
pub async fn ensure_canonical_dir(downloads_dir: &Path, video_id: &str) -> LayoutResult<PathBuf> {
    let dir = canonical_dir(downloads_dir, video_id);
    tokio::fs::create_dir_all(&dir).await?;
    set_dir_mode(&dir).await?;
    Ok(dir)
}

#[cfg(unix)]
async fn set_dir_mode(dir: &Path) -> LayoutResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let permissions = std::fs::Permissions::from_mode(DIR_MODE);
    tokio::fs::set_permissions(dir, permissions).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_dir_mode(_dir: &Path) -> LayoutResult<()> {
    Ok(())
}

/// Place a freshly-populated spool directory's contents into the canonical
/// directory, applying the rename and dedup rules of §4.2 rules 2-6.
pub async fn place_from_spool(
    spool_dir: &Path,
    downloads_dir: &Path,
    video_id: &str,
) -> LayoutResult<CanonicalPlacement> {
    if !spool_dir.is_dir() {
        return Err(LayoutError::SpoolNotFound(spool_dir.to_path_buf()));
    }

    let dir = ensure_canonical_dir(downloads_dir, video_id).await?;
    let contents = scan_spool(spool_dir).await?;

    let video_entry = contents
        .video
        .ok_or_else(|| LayoutError::NoVideoInSpool(spool_dir.to_path_buf()))?;

    for discarded in &contents.discarded_videos {
        debug!(path = %discarded.display(), "dropping non-preferred video container");
        let _ = tokio::fs::remove_file(discarded).await;
    }
    for discarded in &contents.discarded_images {
        let _ = tokio::fs::remove_file(discarded).await;
    }

    let video_ext = video_entry
        .path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4")
        .to_ascii_lowercase();
    let video_dst = remux_to_canonical(&video_entry.path, &dir, video_id, &video_ext).await?;

    let thumbnail_path = if let Some(image) = contents.image {
        let ext = image
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg")
            .to_ascii_lowercase();
        let dst = dir.join(format!("{video_id}.src_thumbnail.{ext}"));
        move_file(&image.path, &dst).await?;
        Some(dst)
    } else {
        None
    };

    if let Some(info_json) = contents.info_json {
        let dst = dir.join(format!("{video_id}.info.json"));
        move_file(&info_json, &dst).await?;
    }

    for vtt in contents.vtt_files {
        let lang = vtt_language_tag(&vtt);
        let dst = dir.join(format!("{video_id}.captions.{lang}.vtt"));
        move_file(&vtt, &dst).await?;
    }

    let (file_hash, file_size) = hash_file(&video_dst).await?;

    info!(video_id, %file_hash, file_size, "placed canonical video");

    Ok(CanonicalPlacement {
        video_path: video_dst,
        thumbnail_path,
        file_hash,
        file_size,
    })
}

/// Place the preferred spool video under its canonical name. mp4 is moved
/// in directly; other containers are remuxed to mp4 (stream copy, no
/// re-encode) per §3's "mp4 preferred; others migrated to mp4 where
/// possible" — falling back to keeping the original container if the remux
/// fails.
async fn remux_to_canonical(
    src: &Path,
    dir: &Path,
    video_id: &str,
    src_ext: &str,
) -> LayoutResult<PathBuf> {
    let mp4_dst = dir.join(format!("{video_id}.video.mp4"));
    if src_ext == "mp4" {
        move_file(src, &mp4_dst).await?;
        return Ok(mp4_dst);
    }

    let remux_cmd = FfmpegCommand::new(src, &mp4_dst).stream_copy();
    match FfmpegRunner::new().run(&remux_cmd).await {
        Ok(()) => {
            tokio::fs::remove_file(src).await.ok();
            Ok(mp4_dst)
        }
        Err(error) => {
            warn!(%error, src_ext, "remux to mp4 failed, keeping original container");
            let fallback_dst = dir.join(format!("{video_id}.video.{src_ext}"));
            move_file(src, &fallback_dst).await?;
            Ok(fallback_dst)
        }
    }
}

/// Move any legacy/off-canonical directory's contents into the canonical
/// directory, then re-run the rename rules. Existing destination names win;
/// the legacy file is discarded on conflict.
pub async fn migrate_legacy_directory(
    legacy_dir: &Path,
    downloads_dir: &Path,
    video_id: &str,
) -> LayoutResult<()> {
    let canonical = ensure_canonical_dir(downloads_dir, video_id).await?;
    if legacy_dir == canonical {
        return Ok(());
    }

    let mut entries = tokio::fs::read_dir(legacy_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let file_name = path.file_name().unwrap().to_owned();
        let dst = canonical.join(&file_name);
        if dst.exists() {
            let _ = tokio::fs::remove_file(&path).await;
            continue;
        }
        move_file(&path, &dst).await?;
    }

    Ok(())
}

/// SHA-256 the file while reading once; size comes from the same pass
/// (§4.2 rule 6).
pub async fn hash_file(path: &Path) -> LayoutResult<(String, u64)> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    let mut total = 0u64;

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    Ok((format!("{:x}", hasher.finalize()), total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn ensure_canonical_dir_creates_directory() {
        let tmp = TempDir::new().unwrap();
        let downloads = tmp.path().join("downloads");
        let dir = ensure_canonical_dir(&downloads, "vid-1").await.unwrap();
        assert!(dir.is_dir());
        assert_eq!(dir, downloads.join("vid-1"));
    }

    #[tokio::test]
    async fn hash_file_returns_sha256_and_size() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sample.bin");
        tokio::fs::write(&path, b"hello world").await.unwrap();
        let (hash, size) = hash_file(&path).await.unwrap();
        assert_eq!(size, 11);
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde"
        );
    }

    #[tokio::test]
    async fn place_from_spool_renames_into_canonical_layout() {
        let tmp = TempDir::new().unwrap();
        let spool = tmp.path().join("spool");
        let downloads = tmp.path().join("downloads");
        tokio::fs::create_dir_all(&spool).await.unwrap();

        tokio::fs::write(spool.join("yt_abc.mkv"), b"video-bytes").await.unwrap();
        tokio::fs::write(spool.join("yt_abc.info.json"), b"{}").await.unwrap();
        tokio::fs::write(spool.join("yt_abc.en.vtt"), b"WEBVTT\n").await.unwrap();
        tokio::fs::write(spool.join("yt_abc.webp"), b"img-bytes").await.unwrap();

        let placement = place_from_spool(&spool, &downloads, "vid-1").await.unwrap();

        assert!(placement.video_path.ends_with("vid-1.video.mkv"));
        assert!(placement.thumbnail_path.unwrap().ends_with("vid-1.src_thumbnail.webp"));
        assert!(downloads.join("vid-1").join("vid-1.info.json").exists());
        assert!(downloads.join("vid-1").join("vid-1.captions.en.vtt").exists());
    }
}
