//! Waveform peak extraction and bucketing (§4.3, property 6).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use rewind_models::WaveformManifest;

use crate::error::{MediaError, MediaResult};

/// Streaming bucketer: feed it mono 16-bit PCM samples, it emits one
/// absolute-peak `i16` per `samples_per_bucket` samples, with a final
/// partial bucket flushed on `finish`.
pub struct PeakBucketer {
    samples_per_bucket: u64,
    current_count: u64,
    current_peak: i16,
    peaks: Vec<i16>,
}

impl PeakBucketer {
    pub fn new(samples_per_bucket: u64) -> Self {
        Self {
            samples_per_bucket: samples_per_bucket.max(1),
            current_count: 0,
            current_peak: 0,
            peaks: Vec::new(),
        }
    }

    pub fn push_sample(&mut self, sample: i16) {
        self.current_peak = self.current_peak.max(sample.saturating_abs());
        self.current_count += 1;
        if self.current_count >= self.samples_per_bucket {
            self.peaks.push(self.current_peak);
            self.current_count = 0;
            self.current_peak = 0;
        }
    }

    pub fn push_samples(&mut self, samples: &[i16]) {
        for &s in samples {
            self.push_sample(s);
        }
    }

    /// Flush a trailing partial bucket (if any samples are pending) and
    /// return all peaks collected so far.
    pub fn finish(mut self) -> Vec<i16> {
        if self.current_count > 0 {
            self.peaks.push(self.current_peak);
        }
        self.peaks
    }
}

/// Serialize peaks to little-endian `i16` bytes for `peaks.i16`.
pub fn encode_peaks(peaks: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(peaks.len() * 2);
    for p in peaks {
        out.extend_from_slice(&p.to_le_bytes());
    }
    out
}

pub fn decode_peaks(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

/// Build the manifest once duration is known from the probe.
pub fn build_manifest(duration_s: f64) -> WaveformManifest {
    WaveformManifest::new(duration_s)
}

pub fn waveform_dir(dir: &Path) -> PathBuf {
    dir.join("waveform")
}

pub fn manifest_path(dir: &Path) -> PathBuf {
    waveform_dir(dir).join("waveform.json")
}

pub fn peaks_path(dir: &Path) -> PathBuf {
    waveform_dir(dir).join("peaks.i16")
}

pub fn no_audio_marker_path(dir: &Path) -> PathBuf {
    waveform_dir(dir).join(".no-audio")
}

/// Present per §4.4: either the `.no-audio` marker, or both the manifest and
/// peaks file.
pub fn waveform_exists(dir: &Path) -> bool {
    no_audio_marker_path(dir).exists() || (manifest_path(dir).exists() && peaks_path(dir).exists())
}

/// Extract mono PCM at the manifest's sample rate straight from ffmpeg's
/// stdout and bucket it into peaks, writing `waveform.json` + `peaks.i16`.
/// If the video has no audio track, writes the `.no-audio` marker instead
/// and does not invoke ffmpeg.
pub async fn generate_waveform(
    video_path: &Path,
    dir: &Path,
    duration_s: f64,
    has_audio: bool,
) -> MediaResult<()> {
    let out_dir = waveform_dir(dir);
    tokio::fs::create_dir_all(&out_dir).await?;

    if waveform_exists(dir) {
        return Ok(());
    }

    if !has_audio {
        tokio::fs::write(no_audio_marker_path(dir), b"").await?;
        return Ok(());
    }

    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

    let manifest = build_manifest(duration_s);

    let mut child = Command::new("ffmpeg")
        .args([
            "-y",
            "-v",
            "error",
            "-i",
            &video_path.to_string_lossy(),
            "-map",
            "0:a:0",
            "-ac",
            "1",
            "-ar",
            &manifest.sample_rate_hz.to_string(),
            "-f",
            "s16le",
            "-",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let mut stdout = child.stdout.take().expect("stdout not captured");
    let mut bucketer = PeakBucketer::new(manifest.samples_per_bucket());
    let mut buf = [0u8; 8192];
    let mut pending_byte: Option<u8> = None;

    loop {
        let n = stdout.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        let mut samples = Vec::with_capacity(chunk.len() / 2 + 1);
        let mut idx = 0;
        if let Some(prev) = pending_byte.take() {
            samples.push(i16::from_le_bytes([prev, chunk[0]]));
            idx = 1;
        }
        while idx + 1 < chunk.len() {
            samples.push(i16::from_le_bytes([chunk[idx], chunk[idx + 1]]));
            idx += 2;
        }
        if idx < chunk.len() {
            pending_byte = Some(chunk[idx]);
        }
        bucketer.push_samples(&samples);
    }

    let status = child.wait().await?;
    if !status.success() {
        return Err(MediaError::ffmpeg_failed(
            "ffmpeg audio extraction failed",
            "",
            status.code(),
        ));
    }

    let peaks = bucketer.finish();
    tokio::fs::write(peaks_path(dir), encode_peaks(&peaks)).await?;
    tokio::fs::write(manifest_path(dir), serde_json::to_vec_pretty(&manifest)?).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucketer_emits_one_peak_per_full_bucket() {
        let mut bucketer = PeakBucketer::new(4);
        bucketer.push_samples(&[1, -2, 3, -4]);
        bucketer.push_samples(&[5, 6, 7, 8]);
        let peaks = bucketer.finish();
        assert_eq!(peaks, vec![4, 8]);
    }

    #[test]
    fn bucketer_flushes_trailing_partial_bucket() {
        let mut bucketer = PeakBucketer::new(4);
        bucketer.push_samples(&[1, -9, 2]);
        let peaks = bucketer.finish();
        assert_eq!(peaks, vec![9]);
    }

    #[test]
    fn encode_decode_peaks_round_trip() {
        let peaks = vec![1i16, -2, 3, i16::MIN, i16::MAX];
        let bytes = encode_peaks(&peaks);
        assert_eq!(bytes.len(), peaks.len() * 2);
        assert_eq!(decode_peaks(&bytes), peaks);
    }

    #[test]
    fn path_helpers_nest_under_waveform_dir() {
        let dir = Path::new("/assets/abc");
        assert_eq!(waveform_dir(dir), PathBuf::from("/assets/abc/waveform"));
        assert_eq!(manifest_path(dir), PathBuf::from("/assets/abc/waveform/waveform.json"));
        assert_eq!(peaks_path(dir), PathBuf::from("/assets/abc/waveform/peaks.i16"));
        assert_eq!(no_audio_marker_path(dir), PathBuf::from("/assets/abc/waveform/.no-audio"));
    }

    #[tokio::test]
    async fn generate_waveform_writes_no_audio_marker_without_invoking_ffmpeg() {
        let tmp = tempfile::tempdir().unwrap();
        generate_waveform(Path::new("/does/not/exist.mp4"), tmp.path(), 12.0, false)
            .await
            .unwrap();
        assert!(no_audio_marker_path(tmp.path()).exists());
        assert!(!manifest_path(tmp.path()).exists());
    }

    #[tokio::test]
    async fn generate_waveform_is_idempotent_once_marker_exists() {
        let tmp = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(waveform_dir(tmp.path())).await.unwrap();
        tokio::fs::write(no_audio_marker_path(tmp.path()), b"").await.unwrap();
        generate_waveform(Path::new("/does/not/exist.mp4"), tmp.path(), 12.0, true)
            .await
            .unwrap();
    }

    #[test]
    fn peaks_byte_length_matches_property_6() {
        let manifest = build_manifest(1.0);
        let samples_per_bucket = manifest.samples_per_bucket();
        let total_samples = samples_per_bucket * 3 + 1; // 3 full buckets + partial
        let mut bucketer = PeakBucketer::new(samples_per_bucket);
        for i in 0..total_samples {
            bucketer.push_sample((i % 100) as i16);
        }
        let peaks = bucketer.finish();
        let bytes = encode_peaks(&peaks);
        assert_eq!(bytes.len() as u64, manifest.expected_peaks_bytes(total_samples));
    }
}
