//! HLS (RFC 8216) master playlist generation, single- and multi-variant
//! (§4.3, property 9).

use std::path::{Path, PathBuf};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Target HLS segment duration (§4.3: "6 s target, fMP4").
pub const SEGMENT_TARGET_S: u64 = 6;

#[derive(Debug, Clone)]
pub struct AudioTrack {
    pub label: String,
    pub playlist_rel_path: String,
    pub default: bool,
}

#[derive(Debug, Clone)]
pub struct VideoVariant {
    pub playlist_rel_path: String,
    pub bandwidth_bps: u64,
    pub width: u32,
    pub height: u32,
}

/// Render `master.m3u8`: one `#EXT-X-STREAM-INF` per variant sorted by
/// bandwidth descending (property 9), one `#EXT-X-MEDIA:TYPE=AUDIO` per
/// track with the first marked `DEFAULT=YES,AUTOSELECT=YES`.
pub fn render_master_playlist(variants: &[VideoVariant], audio_tracks: &[AudioTrack]) -> String {
    let mut sorted_variants = variants.to_vec();
    sorted_variants.sort_by(|a, b| b.bandwidth_bps.cmp(&a.bandwidth_bps));

    let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:7\n");

    for (i, track) in audio_tracks.iter().enumerate() {
        let default = if i == 0 { "YES" } else { "NO" };
        let autoselect = if i == 0 { "YES" } else { "NO" };
        out.push_str(&format!(
            "#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"audio\",NAME=\"{}\",DEFAULT={default},AUTOSELECT={autoselect},URI=\"{}\"\n",
            track.label, track.playlist_rel_path
        ));
    }

    for variant in &sorted_variants {
        out.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{}{}\n{}\n",
            variant.bandwidth_bps,
            variant.width,
            variant.height,
            if audio_tracks.is_empty() {
                String::new()
            } else {
                ",AUDIO=\"audio\"".to_string()
            },
            variant.playlist_rel_path,
        ));
    }

    out
}

pub fn master_playlist_path(hls_dir: &Path) -> PathBuf {
    hls_dir.join("master.m3u8")
}

pub async fn master_playlist_exists(hls_dir: &Path) -> bool {
    master_playlist_path(hls_dir).exists()
}

/// Demux the video stream of `source` into fMP4 HLS segments under
/// `out_dir/video.m3u8`.
pub async fn demux_video_to_hls(source: &Path, out_dir: &Path, rel_name: &str) -> MediaResult<()> {
    let playlist = out_dir.join(format!("{rel_name}.m3u8"));
    let segment_pattern = out_dir.join(format!("{rel_name}-%04d.m4s"));
    let init_pattern = out_dir.join(format!("{rel_name}-init.mp4"));

    let cmd = FfmpegCommand::new(source, &playlist)
        .map("0:v:0")
        .stream_copy()
        .output_arg("-f")
        .output_arg("hls")
        .output_arg("-hls_time")
        .output_arg(SEGMENT_TARGET_S.to_string())
        .output_arg("-hls_segment_type")
        .output_arg("fmp4")
        .output_arg("-hls_fmp4_init_filename")
        .output_arg(init_pattern.to_string_lossy().to_string())
        .output_arg("-hls_segment_filename")
        .output_arg(segment_pattern.to_string_lossy().to_string())
        .output_arg("-hls_playlist_type")
        .output_arg("vod");

    FfmpegRunner::new().run(&cmd).await
}

/// Demux audio stream `stream_index` of `source` to `<label>.m4a`, then
/// segment it into its own HLS playlist.
pub async fn demux_audio_track_to_hls(
    source: &Path,
    stream_index: usize,
    out_dir: &Path,
    label: &str,
) -> MediaResult<()> {
    let playlist = out_dir.join(format!("{label}.m3u8"));
    let segment_pattern = out_dir.join(format!("{label}-%04d.m4s"));
    let init_pattern = out_dir.join(format!("{label}-init.mp4"));

    let cmd = FfmpegCommand::new(source, &playlist)
        .map(format!("0:a:{stream_index}"))
        .stream_copy()
        .output_arg("-f")
        .output_arg("hls")
        .output_arg("-hls_time")
        .output_arg(SEGMENT_TARGET_S.to_string())
        .output_arg("-hls_segment_type")
        .output_arg("fmp4")
        .output_arg("-hls_fmp4_init_filename")
        .output_arg(init_pattern.to_string_lossy().to_string())
        .output_arg("-hls_segment_filename")
        .output_arg(segment_pattern.to_string_lossy().to_string())
        .output_arg("-hls_playlist_type")
        .output_arg("vod");

    FfmpegRunner::new().run(&cmd).await
}

pub async fn write_master_playlist(hls_dir: &Path, content: &str) -> MediaResult<()> {
    tokio::fs::create_dir_all(hls_dir).await?;
    tokio::fs::write(master_playlist_path(hls_dir), content).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(bandwidth: u64) -> VideoVariant {
        VideoVariant {
            playlist_rel_path: format!("v{bandwidth}.m3u8"),
            bandwidth_bps: bandwidth,
            width: 1920,
            height: 1080,
        }
    }

    #[test]
    fn variants_sorted_by_bandwidth_descending() {
        let variants = vec![variant(1_000_000), variant(5_000_000), variant(2_000_000)];
        let playlist = render_master_playlist(&variants, &[]);
        let first = playlist.find("BANDWIDTH=5000000").unwrap();
        let second = playlist.find("BANDWIDTH=2000000").unwrap();
        let third = playlist.find("BANDWIDTH=1000000").unwrap();
        assert!(first < second);
        assert!(second < third);
    }

    #[test]
    fn first_audio_track_marked_default() {
        let tracks = vec![
            AudioTrack {
                label: "eng".to_string(),
                playlist_rel_path: "audio_0.m3u8".to_string(),
                default: true,
            },
            AudioTrack {
                label: "spa".to_string(),
                playlist_rel_path: "audio_1.m3u8".to_string(),
                default: false,
            },
        ];
        let playlist = render_master_playlist(&[variant(1_000_000)], &tracks);
        let eng_line = playlist.lines().find(|l| l.contains("NAME=\"eng\"")).unwrap();
        assert!(eng_line.contains("DEFAULT=YES"));
        let spa_line = playlist.lines().find(|l| l.contains("NAME=\"spa\"")).unwrap();
        assert!(spa_line.contains("DEFAULT=NO"));
    }

    #[test]
    fn single_variant_stream_inf_references_audio_group_when_present() {
        let playlist = render_master_playlist(
            &[variant(1_000_000)],
            &[AudioTrack {
                label: "eng".to_string(),
                playlist_rel_path: "audio_0.m3u8".to_string(),
                default: true,
            }],
        );
        assert!(playlist.contains("AUDIO=\"audio\""));
    }

    #[test]
    fn no_audio_group_reference_without_tracks() {
        let playlist = render_master_playlist(&[variant(1_000_000)], &[]);
        assert!(!playlist.contains("AUDIO="));
    }
}
