//! Seek sprite sheet generation, tiling, and WebVTT cue math (§4.3, property 5).

use std::path::{Path, PathBuf};

use rewind_models::{SeekLevel, SeekManifest};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Number of cues a level needs to cover `duration_s` (ceiling, §4.3).
pub fn cue_count(level: &SeekLevel, duration_s: f64) -> u64 {
    if level.interval_seconds <= 0.0 || duration_s <= 0.0 {
        return 0;
    }
    (duration_s / level.interval_seconds).ceil() as u64
}

/// Placement of cue `k` within the tiled sprite sheets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CuePlacement {
    pub sheet_index: u64,
    pub col: u32,
    pub row: u32,
    pub start_s: f64,
    pub end_s: f64,
}

/// Sheet/cell/time-range for cue index `k`, per the seek VTT law (property 5):
/// sheet = floor(k / (cols*rows)); cell = (k mod cols*rows) mod cols, floor(.. / cols);
/// time range = [k*I, min((k+1)*I, D)].
pub fn cue_placement(level: &SeekLevel, duration_s: f64, k: u64) -> CuePlacement {
    let capacity = level.tile_capacity() as u64;
    let within_sheet = if capacity == 0 { 0 } else { k % capacity };
    let sheet_index = if capacity == 0 { 0 } else { k / capacity };
    let col = (within_sheet % level.cols as u64) as u32;
    let row = (within_sheet / level.cols as u64) as u32;

    let start_s = k as f64 * level.interval_seconds;
    let end_s = ((k + 1) as f64 * level.interval_seconds).min(duration_s);

    CuePlacement {
        sheet_index,
        col,
        row,
        start_s,
        end_s,
    }
}

/// Sheet filename, e.g. `seek-000.jpg`.
pub fn sheet_filename(sheet_index: u64) -> String {
    format!("seek-{sheet_index:03}.jpg")
}

/// Render a WebVTT document covering `duration_s` at `level`'s interval,
/// with an ffmpeg-style `NOTE` line as required of seek-generated captions
/// (§6).
pub fn render_vtt(level: &SeekLevel, duration_s: f64) -> String {
    let mut out = String::from("WEBVTT\n");
    out.push_str(&format!(
        "NOTE rewind-seek-v1 interval={} size={}x{} grid={}x{}\n\n",
        level.interval_seconds, level.thumb_width, level.thumb_height, level.cols, level.rows
    ));

    let count = cue_count(level, duration_s);
    for k in 0..count {
        let placement = cue_placement(level, duration_s, k);
        let sheet = sheet_filename(placement.sheet_index);
        let x = placement.col * level.thumb_width;
        let y = placement.row * level.thumb_height;
        out.push_str(&format!(
            "{}\n{} --> {}\n{sheet}#xywh={x},{y},{},{}\n\n",
            k + 1,
            format_vtt_timestamp(placement.start_s),
            format_vtt_timestamp(placement.end_s),
            level.thumb_width,
            level.thumb_height,
        ));
    }
    out
}

fn format_vtt_timestamp(total_secs: f64) -> String {
    let total_ms = (total_secs * 1000.0).round().max(0.0) as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

pub fn level_dir(dir: &Path, level_name: &str) -> PathBuf {
    dir.join("levels").join(level_name)
}

pub fn seek_manifest_path(dir: &Path) -> PathBuf {
    dir.join("seek.json")
}

fn level_vtt_path(dir: &Path, level: &SeekLevel) -> PathBuf {
    level_dir(dir, &level.name).join("seek.vtt")
}

/// Present once the manifest and every level's VTT have been written.
pub fn seek_exists(dir: &Path, levels: &[SeekLevel]) -> bool {
    seek_manifest_path(dir).exists() && levels.iter().all(|l| level_vtt_path(dir, l).exists())
}

/// Tile one level's sprite sheets with ffmpeg and write its WebVTT cue map.
/// Idempotent: does nothing if the level's VTT already exists.
pub async fn generate_seek_level(
    video_path: &Path,
    dir: &Path,
    level: &SeekLevel,
    duration_s: f64,
) -> MediaResult<()> {
    let out_dir = level_dir(dir, &level.name);
    tokio::fs::create_dir_all(&out_dir).await?;

    let vtt_path = level_vtt_path(dir, level);
    if vtt_path.exists() {
        return Ok(());
    }

    if cue_count(level, duration_s) > 0 {
        let pattern = out_dir.join("seek-%03d.jpg");
        let cmd = FfmpegCommand::new(video_path, &pattern)
            .video_filter(format!("fps=1/{}", level.interval_seconds))
            .video_filter(format!("scale={}:{}", level.thumb_width, level.thumb_height))
            .video_filter(format!("tile={}x{}", level.cols, level.rows));

        FfmpegRunner::new().run(&cmd).await?;
    }

    tokio::fs::write(&vtt_path, render_vtt(level, duration_s)).await?;
    Ok(())
}

/// Generate every level's sprite sheets and the top-level `seek.json`
/// manifest. Idempotent per level.
pub async fn generate_seek_sprites(
    video_path: &Path,
    dir: &Path,
    duration_s: f64,
    levels: &[SeekLevel],
) -> MediaResult<()> {
    tokio::fs::create_dir_all(dir).await?;
    for level in levels {
        generate_seek_level(video_path, dir, level, duration_s).await?;
    }

    let manifest = SeekManifest::new(levels.to_vec());
    tokio::fs::write(seek_manifest_path(dir), serde_json::to_vec_pretty(&manifest)?).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coarse() -> SeekLevel {
        rewind_models::SeekManifest::default_levels()
            .into_iter()
            .find(|l| l.name == "coarse")
            .unwrap()
    }

    #[test]
    fn cue_count_is_ceiling_of_duration_over_interval() {
        let level = coarse();
        assert_eq!(cue_count(&level, 90.0), 3);
        assert_eq!(cue_count(&level, 91.0), 4);
        assert_eq!(cue_count(&level, 0.0), 0);
    }

    #[test]
    fn cue_placement_wraps_sheets_at_capacity() {
        let level = coarse(); // 12 cols x 10 rows = 120 capacity
        let p0 = cue_placement(&level, 10_000.0, 0);
        assert_eq!((p0.sheet_index, p0.col, p0.row), (0, 0, 0));

        let p119 = cue_placement(&level, 10_000.0, 119);
        assert_eq!((p119.sheet_index, p119.col, p119.row), (0, 11, 9));

        let p120 = cue_placement(&level, 10_000.0, 120);
        assert_eq!((p120.sheet_index, p120.col, p120.row), (1, 0, 0));
    }

    #[test]
    fn cue_placement_time_range_clamps_to_duration() {
        let level = coarse();
        let last = cue_placement(&level, 91.0, 3);
        assert_eq!(last.start_s, 90.0);
        assert_eq!(last.end_s, 91.0);
    }

    #[test]
    fn vtt_contains_note_line_and_all_cues() {
        let level = coarse();
        let vtt = render_vtt(&level, 65.0);
        assert!(vtt.starts_with("WEBVTT\n"));
        assert!(vtt.contains("NOTE rewind-seek-v1 interval=30"));
        assert_eq!(vtt.matches("-->").count(), cue_count(&level, 65.0) as usize);
    }

    #[test]
    fn sheet_filename_is_zero_padded() {
        assert_eq!(sheet_filename(0), "seek-000.jpg");
        assert_eq!(sheet_filename(42), "seek-042.jpg");
    }

    #[test]
    fn level_dir_nests_under_levels() {
        let dir = Path::new("/assets/abc/seek");
        assert_eq!(level_dir(dir, "coarse"), PathBuf::from("/assets/abc/seek/levels/coarse"));
        assert_eq!(seek_manifest_path(dir), PathBuf::from("/assets/abc/seek/seek.json"));
    }

    #[tokio::test]
    async fn generate_seek_level_writes_vtt_without_tiling_when_duration_is_zero() {
        let tmp = tempfile::tempdir().unwrap();
        let level = coarse();
        generate_seek_level(Path::new("/does/not/exist.mp4"), tmp.path(), &level, 0.0)
            .await
            .unwrap();
        assert!(level_vtt_path(tmp.path(), &level).exists());
    }

    #[tokio::test]
    async fn generate_seek_level_is_idempotent_once_vtt_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let level = coarse();
        let out_dir = level_dir(tmp.path(), &level.name);
        tokio::fs::create_dir_all(&out_dir).await.unwrap();
        tokio::fs::write(level_vtt_path(tmp.path(), &level), "WEBVTT\n").await.unwrap();

        generate_seek_level(Path::new("/does/not/exist.mp4"), tmp.path(), &level, 9999.0)
            .await
            .unwrap();
    }

    #[test]
    fn seek_exists_requires_manifest_and_every_level_vtt() {
        let tmp = tempfile::tempdir().unwrap();
        let levels = SeekManifest::default_levels();
        assert!(!seek_exists(tmp.path(), &levels));
    }
}
