//! Per-job dispatch and the three job shapes: normal ingest, regeneration,
//! and format-specific merge (§4.6).

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use rewind_db::identity::{assign_id, candidate_urls, canonical_domain, maybe_append_revision, resolve_existing};
use rewind_media::probe::ProbeResult;
use rewind_models::{AssetScope, AssetsStatus, IngestJob, SeekManifest, Video, VideoId};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Everything a dispatched job needs: the gateways, config, and the
/// speech-to-text tool config.
#[derive(Clone)]
pub struct JobContext {
    pub queue: rewind_db::queue::JobQueue,
    pub videos: rewind_db::videos::VideoStore,
    pub transcripts: rewind_db::transcripts::TranscriptStore,
    pub config: WorkerConfig,
    pub whisper: rewind_media::WhisperConfig,
    pub url_expander: std::sync::Arc<dyn rewind_db::identity::UrlExpander>,
}

/// Classify and run a job to completion, marking it succeeded/failed on the
/// queue as a side effect.
pub async fn dispatch(ctx: &JobContext, job: &IngestJob, cancel_rx: &watch::Receiver<bool>) -> WorkerResult<()> {
    if job.is_regeneration() {
        return regenerate(ctx, job, cancel_rx).await;
    }

    if job.is_format_specific() {
        if let Some(video_id) = job.video_id {
            if let Some(video) = ctx.videos.fetch(video_id).await? {
                if video.video_path.is_some() {
                    return format_merge(ctx, job, video, cancel_rx).await;
                }
            }
        }
    }

    ingest(ctx, job, cancel_rx).await
}

/// Merge a fresh `verify()` result's booleans with the prior run's error
/// bookkeeping (§4.4: the verifier never touches `_errors`/`_error_count`).
pub(crate) fn merge_status(prior: &AssetsStatus, fresh: AssetsStatus) -> AssetsStatus {
    AssetsStatus {
        error_count: prior.error_count,
        last_error_at: prior.last_error_at,
        errors: prior.errors.clone(),
        ..fresh
    }
}

fn should_generate_hls(probe: &ProbeResult) -> bool {
    probe.audio_streams.len() >= 2
}

async fn discover_video_path(dir: &Path, video_id: &str) -> Option<PathBuf> {
    let prefix = format!("{video_id}.video.");
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let name = name.to_str()?;
        if name.starts_with(&prefix) {
            return Some(entry.path());
        }
    }
    None
}

async fn generate_hls_single(video_path: &Path, dir: &Path, probe: &ProbeResult) -> rewind_media::MediaResult<()> {
    let hls_dir = dir.join("hls");
    if rewind_media::hls::master_playlist_exists(&hls_dir).await {
        return Ok(());
    }
    tokio::fs::create_dir_all(&hls_dir).await?;

    rewind_media::demux_video_to_hls(video_path, &hls_dir, "video").await?;

    let mut audio_tracks = Vec::new();
    for i in 0..probe.audio_streams.len() {
        let label = format!("audio_{i}");
        rewind_media::demux_audio_track_to_hls(video_path, i, &hls_dir, &label).await?;
        audio_tracks.push(rewind_media::AudioTrack {
            label: label.clone(),
            playlist_rel_path: format!("{label}.m3u8"),
            default: i == 0,
        });
    }

    let variant = rewind_media::VideoVariant {
        playlist_rel_path: "video.m3u8".to_string(),
        bandwidth_bps: probe.bandwidth_bps(),
        width: probe.video.as_ref().map(|v| v.width).unwrap_or(0),
        height: probe.video.as_ref().map(|v| v.height).unwrap_or(0),
    };

    let playlist = rewind_media::render_master_playlist(&[variant], &audio_tracks);
    rewind_media::write_master_playlist(&hls_dir, &playlist).await
}

/// Run every generator in strict order (§5: thumbnail, preview, seek,
/// waveform, captions, HLS), checking cooperatively for cancellation
/// between steps. Each generator is itself idempotent, so this is safe to
/// call whether or not some assets already exist.
pub(crate) async fn run_generators(
    ctx: &JobContext,
    video_path: &Path,
    dir: &Path,
    video_id: VideoId,
    probe: &ProbeResult,
    status: &mut AssetsStatus,
    cancel_rx: &watch::Receiver<bool>,
) {
    let duration_s = probe.duration_s();
    let uuid = video_id.to_string();

    if *cancel_rx.borrow() {
        return;
    }
    match rewind_media::generate_thumbnails(video_path, dir, &uuid, duration_s, false).await {
        Ok(()) => status.clear_error("thumbnail"),
        Err(e) => status.record_error("thumbnail", e.to_string()),
    }

    if *cancel_rx.borrow() {
        return;
    }
    match rewind_media::generate_preview(video_path, dir, &uuid).await {
        Ok(()) => status.clear_error("preview"),
        Err(e) => status.record_error("preview", e.to_string()),
    }

    if *cancel_rx.borrow() {
        return;
    }
    let seek_dir = dir.join("seek");
    match rewind_media::generate_seek_sprites(video_path, &seek_dir, duration_s, &ctx.config.seek_levels()).await {
        Ok(()) => status.clear_error("seek"),
        Err(e) => status.record_error("seek", e.to_string()),
    }

    if *cancel_rx.borrow() {
        return;
    }
    match rewind_media::generate_waveform(video_path, dir, duration_s, probe.has_audio()).await {
        Ok(()) => status.clear_error("waveform"),
        Err(e) => status.record_error("waveform", e.to_string()),
    }

    if *cancel_rx.borrow() {
        return;
    }
    match rewind_media::generate_captions(&ctx.whisper, video_path, dir, &uuid).await {
        Ok(Some(path)) => {
            status.clear_error("captions");
            record_transcript(ctx, video_id, &path).await;
        }
        Ok(None) => {}
        Err(e) => status.record_error("captions", e.to_string()),
    }

    if *cancel_rx.borrow() {
        return;
    }
    if should_generate_hls(probe) {
        match generate_hls_single(video_path, dir, probe).await {
            Ok(()) => status.clear_error("hls"),
            Err(e) => status.record_error("hls", e.to_string()),
        }
    }
}

async fn record_transcript(ctx: &JobContext, video_id: VideoId, vtt_path: &Path) {
    let Ok(vtt) = tokio::fs::read_to_string(vtt_path).await else {
        return;
    };
    let text = rewind_media::parse_vtt_to_text(&vtt);
    let lang = captions_language_tag(vtt_path).unwrap_or_else(|| ctx.whisper.language_tag());
    if let Err(e) = ctx.transcripts.upsert(video_id, &lang, "vtt", &text, &vtt).await {
        tracing::warn!(%video_id, error = %e, "failed to persist transcript");
    }
}

/// Recover the language tag from a `<uuid>.captions.<lang>.vtt` path, since
/// the file may have been placed by the spool (tagged by its own source
/// language) rather than produced by the configured speech-to-text tool.
fn captions_language_tag(vtt_path: &Path) -> Option<String> {
    let name = vtt_path.file_name()?.to_str()?;
    let rest = name.strip_suffix(".vtt")?;
    let (_, lang) = rest.rsplit_once(".captions.")?;
    Some(lang.to_string())
}

/// Re-run a single asset category, force-clearing its prior output first
/// since every leaf generator is idempotent-by-presence.
async fn run_scoped_generator(
    ctx: &JobContext,
    scope: AssetScope,
    video_path: &Path,
    dir: &Path,
    video_id: VideoId,
    probe: &ProbeResult,
    status: &mut AssetsStatus,
) {
    let duration_s = probe.duration_s();
    let uuid = video_id.to_string();

    let result: rewind_media::MediaResult<()> = match scope {
        AssetScope::Thumbnail => rewind_media::generate_thumbnails(video_path, dir, &uuid, duration_s, true).await,
        AssetScope::Preview => {
            let _ = tokio::fs::remove_file(rewind_media::preview::preview_path(dir, &uuid)).await;
            rewind_media::generate_preview(video_path, dir, &uuid).await
        }
        AssetScope::Seek => {
            let seek_dir = dir.join("seek");
            let _ = tokio::fs::remove_dir_all(&seek_dir).await;
            rewind_media::generate_seek_sprites(video_path, &seek_dir, duration_s, &ctx.config.seek_levels()).await
        }
        AssetScope::Waveform => {
            let _ = tokio::fs::remove_dir_all(rewind_media::waveform_dir(dir)).await;
            rewind_media::generate_waveform(video_path, dir, duration_s, probe.has_audio()).await
        }
        AssetScope::Captions => {
            if let Some(existing) = rewind_media::captions::find_existing_captions(dir, &uuid).await {
                let _ = tokio::fs::remove_file(existing).await;
            }
            match rewind_media::generate_captions(&ctx.whisper, video_path, dir, &uuid).await {
                Ok(Some(path)) => {
                    record_transcript(ctx, video_id, &path).await;
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            }
        }
        AssetScope::Hls => {
            let _ = tokio::fs::remove_dir_all(dir.join("hls")).await;
            if should_generate_hls(probe) {
                generate_hls_single(video_path, dir, probe).await
            } else {
                Ok(())
            }
        }
        AssetScope::All => unreachable!("AssetScope::All is handled by run_generators"),
    };

    match result {
        Ok(()) => status.clear_error(scope.as_str()),
        Err(e) => status.record_error(scope.as_str(), e.to_string()),
    }
}

/// A normal ingest job: parse `info.json`, resolve identity, place the
/// spooled files into the canonical directory, and run every generator.
async fn ingest(ctx: &JobContext, job: &IngestJob, cancel_rx: &watch::Receiver<bool>) -> WorkerResult<()> {
    let result = ingest_inner(ctx, job, cancel_rx).await;
    finish_job(ctx, job, result).await
}

async fn ingest_inner(ctx: &JobContext, job: &IngestJob, cancel_rx: &watch::Receiver<bool>) -> WorkerResult<VideoId> {
    let info_json_path = job
        .info_json_path
        .as_ref()
        .ok_or_else(|| WorkerError::info_json_invalid("job missing info_json_path"))?;
    let spool_dir = job
        .spool_dir
        .as_ref()
        .ok_or_else(|| WorkerError::spool_invalid("job missing spool_dir"))?;

    let info_bytes = tokio::fs::read(info_json_path).await?;
    let info: Value =
        serde_json::from_slice(&info_bytes).map_err(|e| WorkerError::info_json_invalid(e.to_string()))?;

    let candidates = candidate_urls(ctx.url_expander.as_ref(), &job.url, &info);
    let existing_id = resolve_existing(ctx.videos.pool(), &candidates).await?;
    let domain = canonical_domain(&job.url);
    let extractor_id = info.get("id").and_then(Value::as_str);
    let video_id = assign_id(existing_id, domain.as_deref(), extractor_id);

    let mut video = match ctx.videos.fetch(video_id).await? {
        Some(existing) => existing,
        None => Video::new(video_id, job.url.clone(), job.archived_by.clone()),
    };
    maybe_append_revision(&mut video, job.refresh, &info);

    let placement =
        rewind_layout::place_from_spool(Path::new(spool_dir), Path::new(&ctx.config.downloads_dir), &video_id.to_string())
            .await?;

    let probe = rewind_media::probe_video(&placement.video_path).await?;

    video.title = info.get("title").and_then(Value::as_str).unwrap_or_default().to_string();
    video.description = info.get("description").and_then(Value::as_str).unwrap_or_default().to_string();
    video.tags = info
        .get("tags")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    video.uploader_id = info.get("uploader_id").and_then(Value::as_str).map(str::to_string);
    video.channel_id = info.get("channel_id").and_then(Value::as_str).map(str::to_string);
    video.upload_date = info.get("upload_date").and_then(Value::as_str).map(str::to_string);
    video.duration_s = Some(probe.duration_s());
    video.view_count = info.get("view_count").and_then(Value::as_i64);
    video.like_count = info.get("like_count").and_then(Value::as_i64);
    video.info_blob = info.clone();
    video.comments_blob = info.get("comments").cloned();
    video.video_path = Some(placement.video_path.to_string_lossy().to_string());
    video.thumbnail_path = placement.thumbnail_path.as_ref().map(|p| p.to_string_lossy().to_string());
    video.file_hash = Some(placement.file_hash.clone());
    video.file_size = Some(placement.file_size as i64);
    video.probe_blob = Some(probe.raw.clone());

    ctx.videos.upsert(&video).await?;

    let dir = rewind_layout::canonical_dir(Path::new(&ctx.config.downloads_dir), &video_id.to_string());
    let mut status = video.assets_status.clone();
    run_generators(ctx, &placement.video_path, &dir, video_id, &probe, &mut status, cancel_rx).await;

    let manifest = SeekManifest::new(ctx.config.seek_levels());
    let fresh = rewind_layout::verify(&dir, &video_id.to_string(), video.file_hash.as_deref(), &manifest).await;
    video.assets_status = merge_status(&status, fresh);
    ctx.videos.update_assets_status(video_id, &video.assets_status).await?;

    ctx.queue.link_download_job(job.id, video_id).await?;
    tokio::fs::remove_dir_all(spool_dir).await.ok();

    Ok(video_id)
}

/// A regeneration job: no spool handoff, carries only a video id and
/// (optionally) a narrowed scope.
async fn regenerate(ctx: &JobContext, job: &IngestJob, cancel_rx: &watch::Receiver<bool>) -> WorkerResult<()> {
    let result = regenerate_inner(ctx, job, cancel_rx).await;
    finish_job(ctx, job, result).await
}

async fn regenerate_inner(ctx: &JobContext, job: &IngestJob, cancel_rx: &watch::Receiver<bool>) -> WorkerResult<VideoId> {
    let video_id = job
        .video_id
        .ok_or_else(|| WorkerError::video_not_found("regeneration job missing video_id"))?;
    let mut video = ctx
        .videos
        .fetch(video_id)
        .await?
        .ok_or_else(|| WorkerError::video_not_found(video_id.to_string()))?;

    let dir = rewind_layout::canonical_dir(Path::new(&ctx.config.downloads_dir), &video_id.to_string());
    let video_path = match video.video_path.clone() {
        Some(p) => PathBuf::from(p),
        None => discover_video_path(&dir, &video_id.to_string())
            .await
            .ok_or_else(|| WorkerError::video_not_found("no canonical video file on disk"))?,
    };

    let probe = rewind_media::probe_video(&video_path).await?;

    let mut status = video.assets_status.clone();
    let scope = job.scope();
    if scope == AssetScope::All {
        run_generators(ctx, &video_path, &dir, video_id, &probe, &mut status, cancel_rx).await;
    } else {
        run_scoped_generator(ctx, scope, &video_path, &dir, video_id, &probe, &mut status).await;
    }

    let manifest = SeekManifest::new(ctx.config.seek_levels());
    let fresh = rewind_layout::verify(&dir, &video_id.to_string(), video.file_hash.as_deref(), &manifest).await;
    video.assets_status = merge_status(&status, fresh);
    ctx.videos.update_assets_status(video_id, &video.assets_status).await?;

    Ok(video_id)
}

#[derive(Serialize)]
struct StreamManifestEntry {
    file: String,
    width: u32,
    height: u32,
    codec: String,
}

/// Dedupe a destination filename under `streams/`, trying `-1`..`-99`
/// suffixes before it (§4.6).
async fn dedupe_filename(dir: &Path, base_name: &str) -> PathBuf {
    let candidate = dir.join(base_name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match base_name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), Some(ext.to_string())),
        None => (base_name.to_string(), None),
    };

    for suffix in 1..=99 {
        let name = match &ext {
            Some(ext) => format!("{stem}-{suffix}.{ext}"),
            None => format!("{stem}-{suffix}"),
        };
        let candidate = dir.join(&name);
        if !candidate.exists() {
            return candidate;
        }
    }

    dir.join(base_name)
}

async fn write_streams_manifest(streams_dir: &Path) -> WorkerResult<()> {
    let mut entries = Vec::new();
    let mut dir_entries = tokio::fs::read_dir(streams_dir).await?;
    while let Some(entry) = dir_entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) == Some("json") {
            continue;
        }
        if let Ok(probe) = rewind_media::probe_video(&path).await {
            if let Some(video) = probe.video {
                entries.push(StreamManifestEntry {
                    file: entry.file_name().to_string_lossy().to_string(),
                    width: video.width,
                    height: video.height,
                    codec: video.codec,
                });
            }
        }
    }
    tokio::fs::write(streams_dir.join("manifest.json"), serde_json::to_vec_pretty(&entries)?).await?;
    Ok(())
}

async fn generate_hls_multi(
    canonical_video_path: &Path,
    streams_dir: &Path,
    dir: &Path,
    canonical_probe: &ProbeResult,
) -> rewind_media::MediaResult<()> {
    let hls_dir = dir.join("hls");
    let _ = tokio::fs::remove_dir_all(&hls_dir).await;
    tokio::fs::create_dir_all(&hls_dir).await?;

    let mut variants = vec![rewind_media::VideoVariant {
        playlist_rel_path: "video_0.m3u8".to_string(),
        bandwidth_bps: canonical_probe.bandwidth_bps(),
        width: canonical_probe.video.as_ref().map(|v| v.width).unwrap_or(0),
        height: canonical_probe.video.as_ref().map(|v| v.height).unwrap_or(0),
    }];
    rewind_media::demux_video_to_hls(canonical_video_path, &hls_dir, "video_0").await?;

    let mut idx = 1;
    let mut entries = tokio::fs::read_dir(streams_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) == Some("json") {
            continue;
        }
        let probe = rewind_media::probe_video(&path).await?;
        let rel_name = format!("video_{idx}");
        rewind_media::demux_video_to_hls(&path, &hls_dir, &rel_name).await?;
        variants.push(rewind_media::VideoVariant {
            playlist_rel_path: format!("{rel_name}.m3u8"),
            bandwidth_bps: probe.bandwidth_bps(),
            width: probe.video.as_ref().map(|v| v.width).unwrap_or(0),
            height: probe.video.as_ref().map(|v| v.height).unwrap_or(0),
        });
        idx += 1;
    }

    let mut audio_tracks = Vec::new();
    for i in 0..canonical_probe.audio_streams.len() {
        let label = format!("audio_{i}");
        rewind_media::demux_audio_track_to_hls(canonical_video_path, i, &hls_dir, &label).await?;
        audio_tracks.push(rewind_media::AudioTrack {
            label: label.clone(),
            playlist_rel_path: format!("{label}.m3u8"),
            default: i == 0,
        });
    }

    let playlist = rewind_media::render_master_playlist(&variants, &audio_tracks);
    rewind_media::write_master_playlist(&hls_dir, &playlist).await
}

/// A format-specific download for a video that's already ingested: mux the
/// new container's video track with the canonical audio track, file it
/// under `streams/`, and regenerate HLS as a multi-variant playlist (§4.6).
async fn format_merge(ctx: &JobContext, job: &IngestJob, video: Video, cancel_rx: &watch::Receiver<bool>) -> WorkerResult<()> {
    let result = format_merge_inner(ctx, job, &video, cancel_rx).await;
    finish_job(ctx, job, result.map(|()| video.id)).await
}

async fn format_merge_inner(
    ctx: &JobContext,
    job: &IngestJob,
    video: &Video,
    cancel_rx: &watch::Receiver<bool>,
) -> WorkerResult<()> {
    let video_id = video.id;
    let spool_dir = job
        .spool_dir
        .as_ref()
        .ok_or_else(|| WorkerError::spool_invalid("format merge job missing spool_dir"))?;

    let dir = rewind_layout::canonical_dir(Path::new(&ctx.config.downloads_dir), &video_id.to_string());
    let streams_dir = dir.join("streams");
    tokio::fs::create_dir_all(&streams_dir).await?;

    let contents = rewind_layout::scan_spool(Path::new(spool_dir)).await?;
    let raw_video = contents
        .video
        .ok_or_else(|| WorkerError::spool_invalid("format merge spool has no video"))?;
    if let Some(info_json) = contents.info_json {
        let _ = tokio::fs::remove_file(&info_json).await;
    }

    let ext = raw_video.path.extension().and_then(|e| e.to_str()).unwrap_or("mp4");
    let raw_dst = dedupe_filename(&streams_dir, &format!("variant.{ext}")).await;
    rewind_media::fs_utils::move_file(&raw_video.path, &raw_dst).await?;

    let canonical_video_path = video
        .video_path
        .as_ref()
        .ok_or_else(|| WorkerError::video_not_found("video has no canonical video_path"))?;

    let muxed_name = format!("muxed-{}", raw_dst.file_name().unwrap().to_string_lossy());
    let muxed_dst = streams_dir.join(&muxed_name);
    let mux_cmd = rewind_media::FfmpegCommand::new(&raw_dst, &muxed_dst)
        .add_input(canonical_video_path)
        .map("0:v:0")
        .map("1:a:0")
        .stream_copy();
    rewind_media::FfmpegRunner::new()
        .with_cancel(cancel_rx.clone())
        .run(&mux_cmd)
        .await?;
    tokio::fs::remove_file(&raw_dst).await.ok();

    write_streams_manifest(&streams_dir).await?;

    let probe = rewind_media::probe_video(Path::new(canonical_video_path)).await?;
    let mut status = video.assets_status.clone();
    match generate_hls_multi(Path::new(canonical_video_path), &streams_dir, &dir, &probe).await {
        Ok(()) => status.clear_error("hls"),
        Err(e) => status.record_error("hls", e.to_string()),
    }

    let manifest = SeekManifest::new(ctx.config.seek_levels());
    let fresh = rewind_layout::verify(&dir, &video_id.to_string(), video.file_hash.as_deref(), &manifest).await;
    let merged = merge_status(&status, fresh);
    ctx.videos.update_assets_status(video_id, &merged).await?;
    ctx.queue.link_download_job(job.id, video_id).await?;
    tokio::fs::remove_dir_all(spool_dir).await.ok();

    Ok(())
}

async fn finish_job(ctx: &JobContext, job: &IngestJob, result: WorkerResult<VideoId>) -> WorkerResult<()> {
    match result {
        Ok(_) => {
            ctx.queue.mark_succeeded(job.id).await?;
            Ok(())
        }
        Err(e) => {
            ctx.queue.mark_failed(job.id, &e.to_string()).await?;
            Err(e)
        }
    }
}
