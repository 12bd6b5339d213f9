//! Hover preview generation (§4.3).

use std::path::{Path, PathBuf};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

const OFFSET_S: f64 = 10.0;
const DURATION_S: f64 = 6.0;
const MAX_WIDTH: u32 = 480;
const CRF: u8 = 28;

pub fn preview_path(dir: &Path, uuid: &str) -> PathBuf {
    dir.join(format!("{uuid}.preview.mp4"))
}

/// A 6 s, audio-less h.264/yuv420p preview starting at offset 10 s, scaled
/// to max width 480, CRF 28, `veryfast` preset. Skipped if the file exists.
pub async fn generate_preview(video_path: &Path, dir: &Path, uuid: &str) -> MediaResult<()> {
    let out = preview_path(dir, uuid);
    if out.exists() {
        return Ok(());
    }

    let cmd = FfmpegCommand::new(video_path, &out)
        .seek(OFFSET_S)
        .duration(DURATION_S)
        .video_filter(format!("scale={MAX_WIDTH}:-2"))
        .video_filter("format=yuv420p")
        .video_codec("libx264")
        .crf(CRF)
        .preset("veryfast")
        .output_arg("-an");

    FfmpegRunner::new().run(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_path_uses_uuid_prefix() {
        let dir = Path::new("/videos/abc");
        assert_eq!(
            preview_path(dir, "u1"),
            PathBuf::from("/videos/abc/u1.preview.mp4")
        );
    }
}
