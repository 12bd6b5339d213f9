//! Speech-to-text captions generation (§4.3, §6).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{MediaError, MediaResult};
use crate::fs_utils::move_file;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhisperDevice {
    Cpu,
    Cuda,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhisperTask {
    Transcribe,
    Translate,
}

#[derive(Debug, Clone)]
pub struct WhisperConfig {
    pub enabled: bool,
    pub cmd: String,
    pub model: String,
    pub device: WhisperDevice,
    pub language: Option<String>,
    pub task: WhisperTask,
    pub extra_args: Vec<String>,
    pub timeout_seconds: u64,
}

impl WhisperConfig {
    /// Load from the `WHISPER_*` environment variables (§6).
    pub fn from_env() -> Self {
        let enabled = std::env::var("WHISPER_ENABLED")
            .ok()
            .map(|v| matches!(v.as_str(), "1" | "true"))
            .unwrap_or(false);

        let cmd = std::env::var("WHISPER_CMD").unwrap_or_else(|_| "whisper".to_string());
        let model = std::env::var("WHISPER_MODEL").unwrap_or_else(|_| "base".to_string());

        let device = match std::env::var("WHISPER_DEVICE").ok().as_deref() {
            Some("cuda") => WhisperDevice::Cuda,
            _ => WhisperDevice::Cpu,
        };

        let language = std::env::var("WHISPER_LANGUAGE")
            .ok()
            .filter(|v| !v.is_empty() && v != "auto");

        let task = match std::env::var("WHISPER_TASK").ok().as_deref() {
            Some("translate") => WhisperTask::Translate,
            _ => WhisperTask::Transcribe,
        };

        let extra_args = std::env::var("WHISPER_ARGS")
            .ok()
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let timeout_seconds = std::env::var("WHISPER_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1800);

        Self {
            enabled,
            cmd,
            model,
            device,
            language,
            task,
            extra_args,
            timeout_seconds,
        }
    }

    /// Language tag recorded alongside the generated captions file: the
    /// configured language if not `auto`/absent, else `und` (§4.3).
    pub fn language_tag(&self) -> String {
        self.language.clone().unwrap_or_else(|| "und".to_string())
    }
}

pub fn captions_path(dir: &Path, uuid: &str, lang: &str) -> PathBuf {
    dir.join(format!("{uuid}.captions.{lang}.vtt"))
}

/// Any already-placed `<uuid>.captions.*.vtt` file, regardless of its
/// language tag — a spool-supplied subtitle is tagged by its own source
/// language, which need not match the configured Whisper language.
pub async fn find_existing_captions(dir: &Path, uuid: &str) -> Option<PathBuf> {
    let prefix = format!("{uuid}.captions.");
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let name = name.to_str()?;
        if name.starts_with(&prefix) && name.ends_with(".vtt") {
            return Some(entry.path());
        }
    }
    None
}

/// If a canonical captions file already exists (in any language), nothing
/// to do. Otherwise, when enabled, invoke the external transcription tool
/// against `audio_source` and move its VTT output into the canonical
/// location.
pub async fn generate_captions(
    config: &WhisperConfig,
    audio_source: &Path,
    dir: &Path,
    uuid: &str,
) -> MediaResult<Option<PathBuf>> {
    if let Some(existing) = find_existing_captions(dir, uuid).await {
        return Ok(Some(existing));
    }

    if !config.enabled {
        return Ok(None);
    }

    let lang = config.language_tag();
    let existing = captions_path(dir, uuid, &lang);

    let workdir = tempfile_dir(dir, uuid)?;
    tokio::fs::create_dir_all(&workdir).await?;

    let mut cmd = Command::new(&config.cmd);
    cmd.arg(audio_source)
        .arg("--model")
        .arg(&config.model)
        .arg("--device")
        .arg(match config.device {
            WhisperDevice::Cpu => "cpu",
            WhisperDevice::Cuda => "cuda",
        })
        .arg("--task")
        .arg(match config.task {
            WhisperTask::Transcribe => "transcribe",
            WhisperTask::Translate => "translate",
        })
        .arg("--output_format")
        .arg("vtt")
        .arg("--output_dir")
        .arg(&workdir);

    if let Some(lang) = &config.language {
        cmd.arg("--language").arg(lang);
    }
    cmd.args(&config.extra_args);
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

    info!(cmd = config.cmd, model = config.model, "invoking speech-to-text tool");

    let output = tokio::time::timeout(
        std::time::Duration::from_secs(config.timeout_seconds),
        cmd.output(),
    )
    .await
    .map_err(|_| MediaError::Timeout(config.timeout_seconds))??;

    if !output.status.success() {
        warn!(
            stderr = %String::from_utf8_lossy(&output.stderr),
            "speech-to-text tool exited non-zero"
        );
        return Err(MediaError::WhisperFailed(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }

    let produced = find_vtt_output(&workdir, audio_source).await?;
    move_file(&produced, &existing).await?;
    tokio::fs::remove_dir_all(&workdir).await.ok();

    Ok(Some(existing))
}

fn tempfile_dir(dir: &Path, uuid: &str) -> MediaResult<PathBuf> {
    Ok(dir.join(format!(".whisper-{uuid}")))
}

async fn find_vtt_output(workdir: &Path, audio_source: &Path) -> MediaResult<PathBuf> {
    let stem = audio_source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio");

    let candidate = workdir.join(format!("{stem}.vtt"));
    if candidate.exists() {
        return Ok(candidate);
    }

    let mut entries = tokio::fs::read_dir(workdir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("vtt") {
            return Ok(path);
        }
    }

    Err(MediaError::WhisperFailed(
        "no .vtt output produced by speech-to-text tool".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_tag_falls_back_to_und() {
        let config = WhisperConfig {
            enabled: true,
            cmd: "whisper".to_string(),
            model: "base".to_string(),
            device: WhisperDevice::Cpu,
            language: None,
            task: WhisperTask::Transcribe,
            extra_args: vec![],
            timeout_seconds: 60,
        };
        assert_eq!(config.language_tag(), "und");
    }

    #[test]
    fn language_tag_uses_configured_value() {
        let config = WhisperConfig {
            language: Some("en".to_string()),
            ..WhisperConfig {
                enabled: true,
                cmd: "whisper".to_string(),
                model: "base".to_string(),
                device: WhisperDevice::Cpu,
                language: None,
                task: WhisperTask::Transcribe,
                extra_args: vec![],
                timeout_seconds: 60,
            }
        };
        assert_eq!(config.language_tag(), "en");
    }

    #[test]
    fn captions_path_matches_canonical_naming() {
        let dir = Path::new("/videos/abc");
        assert_eq!(
            captions_path(dir, "u1", "en"),
            PathBuf::from("/videos/abc/u1.captions.en.vtt")
        );
    }
}
