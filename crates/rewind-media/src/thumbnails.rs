//! Thumbnail variant generation (§4.3).

use std::path::{Path, PathBuf};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// `(label, max_width)` pairs, in the order variants are generated.
pub const VARIANTS: &[(&str, u32)] = &[
    ("xs", 320),
    ("sm", 640),
    ("md", 768),
    ("lg", 1024),
    ("xl", 1280),
    ("2xl", 1536),
];

/// The variant the `<uuid>.thumbnail.jpg` legacy alias points to.
pub const LEGACY_VARIANT: &str = "sm";

/// Offset (seconds) at which the source frame is extracted, clamped to the
/// video's duration.
pub fn extract_offset_s(duration_s: f64) -> f64 {
    5.0_f64.min(duration_s.max(0.0))
}

pub fn variant_path(dir: &Path, uuid: &str, label: &str) -> PathBuf {
    dir.join(format!("{uuid}.thumbnail.{label}.jpg"))
}

pub fn legacy_path(dir: &Path, uuid: &str) -> PathBuf {
    dir.join(format!("{uuid}.thumbnail.jpg"))
}

/// Generate all six thumbnail size variants plus the legacy alias.
///
/// Idempotent: an existing, valid variant is left untouched unless `force`.
pub async fn generate_thumbnails(
    video_path: &Path,
    dir: &Path,
    uuid: &str,
    duration_s: f64,
    force: bool,
) -> MediaResult<()> {
    let offset = extract_offset_s(duration_s);

    for (label, max_width) in VARIANTS {
        let out = variant_path(dir, uuid, label);
        if !force && is_valid_thumbnail(&out, *max_width).await {
            continue;
        }

        let cmd = FfmpegCommand::new(video_path, &out)
            .seek(offset)
            .single_frame()
            .video_filter(format!("scale={max_width}:-2:flags=lanczos"))
            .output_arg("-q:v")
            .output_arg("2");

        FfmpegRunner::new().run(&cmd).await?;

        if !is_valid_thumbnail(&out, *max_width).await {
            return Err(MediaError::InvalidVideo(format!(
                "generated thumbnail {out:?} failed validity check"
            )));
        }
    }

    let legacy = legacy_path(dir, uuid);
    if force || !legacy.exists() {
        let source = variant_path(dir, uuid, LEGACY_VARIANT);
        link_or_copy(&source, &legacy).await?;
    }

    Ok(())
}

/// JPEG decodable and width <= max_width (§4.3 thumbnail validity rule).
pub async fn is_valid_thumbnail(path: &Path, max_width: u32) -> bool {
    let Ok(bytes) = tokio::fs::read(path).await else {
        return false;
    };
    match jpeg_width(&bytes) {
        Some(width) => width <= max_width,
        None => false,
    }
}

/// Hardlink `src` to `dst`, falling back to a copy when the filesystem
/// doesn't support hardlinks (e.g. cross-device).
async fn link_or_copy(src: &Path, dst: &Path) -> MediaResult<()> {
    if dst.exists() {
        tokio::fs::remove_file(dst).await?;
    }
    let src_for_link = src.to_path_buf();
    let dst_for_link = dst.to_path_buf();
    let hardlinked = tokio::task::spawn_blocking(move || std::fs::hard_link(&src_for_link, &dst_for_link))
        .await
        .map_err(|e| MediaError::Io(std::io::Error::other(e)))?;

    if hardlinked.is_ok() {
        return Ok(());
    }

    tokio::fs::copy(src, dst).await?;
    Ok(())
}

/// Minimal JPEG SOF0/SOF2 width parser: scans markers for a start-of-frame
/// segment and reads the width field, without pulling in an image-decoding
/// dependency.
fn jpeg_width(bytes: &[u8]) -> Option<u32> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }
    let mut i = 2;
    while i + 4 <= bytes.len() {
        if bytes[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = bytes[i + 1];
        if (0xC0..=0xCF).contains(&marker) && marker != 0xC4 && marker != 0xC8 && marker != 0xCC {
            if i + 9 > bytes.len() {
                return None;
            }
            let height = u16::from_be_bytes([bytes[i + 5], bytes[i + 6]]) as u32;
            let width = u16::from_be_bytes([bytes[i + 7], bytes[i + 8]]) as u32;
            let _ = height;
            return Some(width);
        }
        if marker == 0xD8 || marker == 0xD9 {
            i += 2;
            continue;
        }
        let len = u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]) as usize;
        i += 2 + len;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_clamps_to_short_durations() {
        assert_eq!(extract_offset_s(10.0), 5.0);
        assert_eq!(extract_offset_s(2.0), 2.0);
        assert_eq!(extract_offset_s(0.0), 0.0);
    }

    #[test]
    fn variant_labels_cover_all_six_widths() {
        assert_eq!(VARIANTS.len(), 6);
        assert_eq!(VARIANTS.iter().map(|(_, w)| *w).max(), Some(1536));
    }

    #[test]
    fn legacy_variant_is_sm() {
        assert_eq!(LEGACY_VARIANT, "sm");
        assert!(VARIANTS.iter().any(|(l, w)| *l == LEGACY_VARIANT && *w == 640));
    }

    #[test]
    fn jpeg_width_parses_minimal_sof0() {
        // FFD8 SOI, FFC0 SOF0 len=11, precision=8, height=10,width=20,components=1
        let bytes: Vec<u8> = vec![
            0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x0A, 0x00, 0x14, 0x01, 0x00, 0x00,
            0x00,
        ];
        assert_eq!(jpeg_width(&bytes), Some(20));
    }

    #[test]
    fn jpeg_width_rejects_non_jpeg() {
        assert_eq!(jpeg_width(b"not a jpeg"), None);
    }
}
