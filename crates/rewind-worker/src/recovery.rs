//! Recovery and catchup scheduler (§4.7, §8): runs as a sibling task next
//! to every worker's drain loop, on startup and every `catchup_interval`.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;

use rewind_models::SeekManifest;

use crate::pipeline::{merge_status, run_generators, JobContext};

const CATCHUP_SCOPE: &str = "catchup";

pub async fn run_recovery_loop(ctx: Arc<JobContext>, worker_index: usize, mut shutdown_rx: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval(ctx.config.catchup_interval);

    loop {
        run_recovery_pass(&ctx, worker_index).await;

        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
            }
            _ = tick.tick() => {}
        }
    }
}

async fn run_recovery_pass(ctx: &JobContext, worker_index: usize) {
    match ctx.queue.recover_stuck().await {
        Ok(count) if count > 0 => tracing::info!(worker_index, count, "recovered stuck jobs"),
        Ok(_) => {}
        Err(e) => tracing::warn!(worker_index, error = %e, "recover_stuck failed"),
    }

    match ctx.queue.fail_excessive_retry(ctx.config.max_attempts).await {
        Ok(count) if count > 0 => tracing::info!(worker_index, count, "failed jobs exceeding retry budget"),
        Ok(_) => {}
        Err(e) => tracing::warn!(worker_index, error = %e, "fail_excessive_retry failed"),
    }

    let candidates = match ctx.videos.list_incomplete(ctx.config.catchup_batch_size as i64).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::warn!(worker_index, error = %e, "failed to list incomplete videos for catchup");
            return;
        }
    };

    for video_id in candidates {
        let scope_key = video_id.to_string();
        let acquired = match ctx.queue.try_advisory_lock(CATCHUP_SCOPE, &scope_key).await {
            Ok(acquired) => acquired,
            Err(e) => {
                tracing::warn!(worker_index, %video_id, error = %e, "advisory lock attempt failed");
                continue;
            }
        };
        if !acquired {
            continue;
        }

        catchup_one(ctx, video_id).await;

        if let Err(e) = ctx.queue.advisory_unlock(CATCHUP_SCOPE, &scope_key).await {
            tracing::warn!(worker_index, %video_id, error = %e, "advisory unlock failed");
        }

        tokio::time::sleep(ctx.config.catchup_sleep).await;
    }
}

/// One video's catchup unit: migrate any legacy directory, probe, hash if
/// missing, run whatever generators are still missing, and refresh
/// `assets_status`.
async fn catchup_one(ctx: &JobContext, video_id: rewind_models::VideoId) {
    let Ok(Some(mut video)) = ctx.videos.fetch(video_id).await else {
        return;
    };

    let dir = rewind_layout::canonical_dir(Path::new(&ctx.config.downloads_dir), &video_id.to_string());
    let legacy_dir = Path::new(&ctx.config.downloads_dir).join(format!("legacy-{video_id}"));
    if legacy_dir.is_dir() {
        let _ = rewind_layout::migrate_legacy_directory(&legacy_dir, Path::new(&ctx.config.downloads_dir), &video_id.to_string()).await;
    }

    let video_path = match video.video_path.clone() {
        Some(p) => std::path::PathBuf::from(p),
        None => {
            let mut status = video.assets_status.clone();
            status.record_error("video_file", "no canonical video file on disk".to_string());
            let _ = ctx.videos.update_assets_status(video_id, &status).await;
            return;
        }
    };

    let probe = match rewind_media::probe_video(&video_path).await {
        Ok(probe) => probe,
        Err(e) => {
            let mut status = video.assets_status.clone();
            status.record_error("video_file", e.to_string());
            let _ = ctx.videos.update_assets_status(video_id, &status).await;
            return;
        }
    };

    if video.file_hash.is_none() {
        if let Ok((hash, size)) = rewind_layout::hash_file(&video_path).await {
            video.file_hash = Some(hash);
            video.file_size = Some(size as i64);
            let _ = ctx.videos.upsert(&video).await;
        }
    }

    let cancel_rx_unused = tokio::sync::watch::channel(false).1;
    let mut status = video.assets_status.clone();
    run_generators(ctx, &video_path, &dir, video_id, &probe, &mut status, &cancel_rx_unused).await;

    let manifest = SeekManifest::new(ctx.config.seek_levels());
    let fresh = rewind_layout::verify(&dir, &video_id.to_string(), video.file_hash.as_deref(), &manifest).await;
    let merged = merge_status(&status, fresh);
    let _ = ctx.videos.update_assets_status(video_id, &merged).await;
}
