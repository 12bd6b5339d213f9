//! ffmpeg command builder and runner (§4.1).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::Progress;

/// Extensions whose muxers benefit from `-movflags +faststart`.
const FASTSTART_EXTS: [&str; 4] = ["mp4", "m4a", "mov", "m4s"];

/// Builder for ffmpeg invocations.
///
/// Video filters (`-vf`) are concatenated in insertion order, independent of
/// the audio filter chain (`-af`), matching §4.1's filter-chain rule.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<PathBuf>,
    output: PathBuf,
    input_args: Vec<String>,
    output_args: Vec<String>,
    video_filters: Vec<String>,
    audio_filters: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            inputs: vec![input.as_ref().to_path_buf()],
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            video_filters: Vec::new(),
            audio_filters: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// A second `-i` input, e.g. muxing a separately-demuxed audio track.
    pub fn add_input(mut self, input: impl AsRef<Path>) -> Self {
        self.inputs.push(input.as_ref().to_path_buf());
        self
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{seconds:.3}"))
    }

    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{seconds:.3}"))
    }

    pub fn video_filter(mut self, filter: impl Into<String>) -> Self {
        self.video_filters.push(filter.into());
        self
    }

    pub fn audio_filter(mut self, filter: impl Into<String>) -> Self {
        self.audio_filters.push(filter.into());
        self
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn stream_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    pub fn map(self, spec: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(spec)
    }

    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    pub fn single_frame(self) -> Self {
        self.output_arg("-vframes").output_arg("1")
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Decompose a speed change outside `[0.5, 2.0]` into a chain of
    /// in-range `atempo` steps (§4.1).
    pub fn audio_tempo(mut self, factor: f64) -> Self {
        for step in tempo_steps(factor) {
            self.audio_filters.push(format!("atempo={step:.6}"));
        }
        self
    }

    fn faststart_flag(&self) -> Option<&'static str> {
        let ext = self
            .output
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)?;
        FASTSTART_EXTS
            .contains(&ext.as_str())
            .then_some("+faststart")
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }
        args.push("-v".to_string());
        args.push(self.log_level.clone());
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.input_args.clone());
        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.to_string_lossy().to_string());
        }

        args.extend(self.output_args.clone());

        if !self.video_filters.is_empty() {
            args.push("-vf".to_string());
            args.push(self.video_filters.join(","));
        }
        if !self.audio_filters.is_empty() {
            args.push("-af".to_string());
            args.push(self.audio_filters.join(","));
        }
        if let Some(flag) = self.faststart_flag() {
            args.push("-movflags".to_string());
            args.push(flag.to_string());
        }

        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// Decompose an overall speed `factor` into steps each within `[0.5, 2.0]`,
/// the range ffmpeg's `atempo` filter accepts per application.
fn tempo_steps(factor: f64) -> Vec<f64> {
    if factor <= 0.0 {
        return vec![1.0];
    }
    let mut remaining = factor;
    let mut steps = Vec::new();
    while remaining > 2.0 {
        steps.push(2.0);
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        steps.push(0.5);
        remaining /= 0.5;
    }
    steps.push(remaining);
    steps
}

/// Runs `FfmpegCommand`s, parsing `-progress pipe:2` output and honoring
/// cancellation/timeout.
pub struct FfmpegRunner {
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout_secs: Option<u64>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self {
            cancel_rx: None,
            timeout_secs: None,
        }
    }

    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, progress_sink: F) -> MediaResult<()>
    where
        F: Fn(Progress) + Send + 'static,
    {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!(args = %args.join(" "), "running ffmpeg");

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child.stderr.take().expect("stderr not captured");
        let mut reader = BufReader::new(stderr).lines();
        let mut captured_stderr = String::new();

        let progress_handle = tokio::spawn(async move {
            let mut current = Progress::default();
            let mut log = String::new();
            while let Ok(Some(line)) = reader.next_line().await {
                log.push_str(&line);
                log.push('\n');
                if let Some(progress) = parse_progress_line(&line, &mut current) {
                    progress_sink(progress);
                }
            }
            log
        });

        let result = self.wait_for_completion(&mut child).await;
        if let Ok(log) = progress_handle.await {
            captured_stderr = log;
        }

        result.map_err(|e| match e {
            MediaError::FfmpegFailed {
                message,
                exit_code,
                stderr_tail,
            } if stderr_tail.is_empty() => {
                MediaError::ffmpeg_failed(message, &captured_stderr, exit_code)
            }
            other => other,
        })
    }

    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<()> {
        let wait_future = child.wait();

        let status = if let Some(timeout_secs) = self.timeout_secs {
            match tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), wait_future).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(timeout_secs, "ffmpeg timed out, killing process");
                    let _ = child.kill().await;
                    return Err(MediaError::Timeout(timeout_secs));
                }
            }
        } else {
            wait_future.await?
        };

        if let Some(ref cancel_rx) = self.cancel_rx {
            if *cancel_rx.borrow() {
                info!("ffmpeg cancelled, killing process");
                let _ = child.kill().await;
                return Err(MediaError::Cancelled);
            }
        }

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "ffmpeg exited with non-zero status",
                "",
                status.code(),
            ))
        }
    }
}

/// Parse one `-progress pipe:2` key=value line; returns `Some` only on the
/// line that completes an update (`progress=continue|end`).
fn parse_progress_line(line: &str, current: &mut Progress) -> Option<Progress> {
    let line = line.trim();
    let (key, value) = line.split_once('=')?;

    match key {
        "frame" => current.frame = value.parse().unwrap_or(current.frame),
        "fps" => current.fps = value.parse().unwrap_or(current.fps),
        "bitrate" => current.bitrate_str = value.to_string(),
        "total_size" => current.total_size = value.parse().unwrap_or(current.total_size),
        "out_time_us" => current.out_time_us = value.parse().unwrap_or(current.out_time_us),
        "out_time_ms" => {
            if let Ok(ms) = value.parse::<i64>() {
                current.out_time_us = ms * 1000;
            }
        }
        "speed" => current.speed_str = value.to_string(),
        "progress" => {
            current.state = value.to_string();
            return Some(current.clone());
        }
        _ => {}
    }
    None
}

pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_builder_produces_expected_flags() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .seek(10.0)
            .duration(30.0)
            .video_codec("libx264")
            .crf(18);

        let args = cmd.build_args();
        assert!(args.contains(&"-ss".to_string()));
        assert!(args.contains(&"10.000".to_string()));
        assert!(args.contains(&"-c:v".to_string()));
        assert!(args.contains(&"libx264".to_string()));
    }

    #[test]
    fn faststart_applied_only_to_relevant_extensions() {
        let mp4 = FfmpegCommand::new("in.mkv", "out.mp4").build_args();
        assert!(mp4.contains(&"-movflags".to_string()));

        let mkv = FfmpegCommand::new("in.mp4", "out.mkv").build_args();
        assert!(!mkv.contains(&"-movflags".to_string()));
    }

    #[test]
    fn video_and_audio_filters_are_independent_chains() {
        let cmd = FfmpegCommand::new("in.mp4", "out.mp4")
            .video_filter("scale=640:-2")
            .video_filter("format=yuv420p")
            .audio_filter("volume=2.0");
        let args = cmd.build_args();
        let vf_idx = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[vf_idx + 1], "scale=640:-2,format=yuv420p");
        let af_idx = args.iter().position(|a| a == "-af").unwrap();
        assert_eq!(args[af_idx + 1], "volume=2.0");
    }

    #[test]
    fn tempo_steps_keep_each_factor_in_range() {
        for step in tempo_steps(5.0) {
            assert!((0.5..=2.0).contains(&step));
        }
        for step in tempo_steps(0.1) {
            assert!((0.5..=2.0).contains(&step));
        }
    }

    #[test]
    fn progress_parsing_emits_on_progress_key() {
        let mut progress = Progress::default();
        assert!(parse_progress_line("frame=120", &mut progress).is_none());
        assert!(parse_progress_line("out_time_us=5000000", &mut progress).is_none());
        let emitted = parse_progress_line("progress=continue", &mut progress).unwrap();
        assert_eq!(emitted.frame, 120);
        assert_eq!(emitted.out_time_us, 5_000_000);
        assert!(!emitted.is_terminal());

        let last = parse_progress_line("progress=end", &mut progress).unwrap();
        assert!(last.is_terminal());
    }
}
