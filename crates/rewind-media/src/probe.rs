//! `probe(path) -> ProbeResult` (§3, §4.1).

use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    channels: Option<u32>,
    sample_rate: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    pub pix_fmt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub codec: String,
    pub channels: u32,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub name: String,
    pub duration_s: f64,
    pub size_bytes: u64,
    pub bitrate_bps: u64,
}

/// Parsed probe output, plus the full raw document for anything a caller
/// needs that isn't surfaced in the typed fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub video: Option<VideoStreamInfo>,
    pub audio_streams: Vec<AudioStreamInfo>,
    pub container: ContainerInfo,
    pub raw: Value,
}

impl ProbeResult {
    pub fn has_audio(&self) -> bool {
        !self.audio_streams.is_empty()
    }

    pub fn duration_s(&self) -> f64 {
        self.container.duration_s
    }

    /// Bandwidth used for HLS `#EXT-X-STREAM-INF` lines: probe bitrate if
    /// known, else derived from size/duration, else a 10 Mbps fallback
    /// (§4.3 HLS rule).
    pub fn bandwidth_bps(&self) -> u64 {
        if self.container.bitrate_bps > 0 {
            return self.container.bitrate_bps;
        }
        if self.container.duration_s > 0.0 {
            return ((self.container.size_bytes as f64 * 8.0) / self.container.duration_s) as u64;
        }
        10_000_000
    }
}

pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<ProbeResult> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ProbeFailed {
            message: "ffprobe exited non-zero".to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let raw: Value = serde_json::from_slice(&output.stdout)?;
    let probe: FfprobeOutput = serde_json::from_value(raw.clone())?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .map(|s| VideoStreamInfo {
            width: s.width.unwrap_or(0),
            height: s.height.unwrap_or(0),
            fps: s
                .avg_frame_rate
                .as_deref()
                .or(s.r_frame_rate.as_deref())
                .and_then(parse_frame_rate)
                .unwrap_or(0.0),
            codec: s.codec_name.clone().unwrap_or_default(),
            pix_fmt: s.pix_fmt.clone().unwrap_or_default(),
        });

    let audio_streams = probe
        .streams
        .iter()
        .filter(|s| s.codec_type == "audio")
        .map(|s| AudioStreamInfo {
            codec: s.codec_name.clone().unwrap_or_default(),
            channels: s.channels.unwrap_or(0),
            sample_rate: s.sample_rate.as_deref().and_then(|r| r.parse().ok()).unwrap_or(0),
        })
        .collect();

    let container = ContainerInfo {
        name: probe.format.format_name.clone().unwrap_or_default(),
        duration_s: probe
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse().ok())
            .unwrap_or(0.0),
        size_bytes: probe.format.size.as_deref().and_then(|s| s.parse().ok()).unwrap_or(0),
        bitrate_bps: probe.format.bit_rate.as_deref().and_then(|b| b.parse().ok()).unwrap_or(0),
    };

    Ok(ProbeResult {
        video,
        audio_streams,
        container,
        raw,
    })
}

fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_frame_rate_handles_fraction_and_plain() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("30/0").is_none());
    }

    #[test]
    fn bandwidth_prefers_probe_bitrate_then_derives_then_falls_back() {
        let base = ContainerInfo {
            name: "mov,mp4".into(),
            duration_s: 10.0,
            size_bytes: 0,
            bitrate_bps: 5_000_000,
        };
        let result = ProbeResult {
            video: None,
            audio_streams: vec![],
            container: base,
            raw: Value::Null,
        };
        assert_eq!(result.bandwidth_bps(), 5_000_000);

        let derived = ProbeResult {
            container: ContainerInfo {
                bitrate_bps: 0,
                size_bytes: 1_250_000,
                duration_s: 10.0,
                name: "mov,mp4".into(),
            },
            ..result
        };
        assert_eq!(derived.bandwidth_bps(), 1_000_000);

        let fallback = ProbeResult {
            container: ContainerInfo {
                bitrate_bps: 0,
                size_bytes: 0,
                duration_s: 0.0,
                name: "mov,mp4".into(),
            },
            ..derived
        };
        assert_eq!(fallback.bandwidth_bps(), 10_000_000);
    }
}
