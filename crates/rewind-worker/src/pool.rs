//! Worker pool: N independent drain loops plus a per-worker recovery
//! scheduler sibling task (§4.6, §4.7, §8).

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::WorkerError;
use crate::logging::JobLogger;
use crate::pipeline::{dispatch, JobContext};
use crate::recovery::run_recovery_loop;

/// Spawn `ctx.config.ingest_workers` independent drain loops, each paired
/// with its own recovery-scheduler sibling task. Returns once `shutdown_rx`
/// observes `true` and every spawned task has joined.
pub async fn run_workers(ctx: Arc<JobContext>, shutdown_rx: watch::Receiver<bool>) {
    let worker_count = ctx.config.ingest_workers;
    let mut handles = Vec::with_capacity(worker_count * 2);

    for index in 0..worker_count {
        let worker_ctx = ctx.clone();
        let worker_shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            drain_loop(worker_ctx, index, worker_shutdown).await;
        }));

        let recovery_ctx = ctx.clone();
        let recovery_shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            run_recovery_loop(recovery_ctx, index, recovery_shutdown).await;
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
}

/// A single worker's drain loop: dequeue and dispatch jobs until the queue
/// is empty, then wait on whichever of cancellation / notification /
/// catchup tick / fallback timer comes first before draining again.
async fn drain_loop(ctx: Arc<JobContext>, worker_index: usize, mut shutdown_rx: watch::Receiver<bool>) {
    let cancel_rx = shutdown_rx.clone();
    let mut listener = match ctx.queue.listen(&ctx.config.notify_channel).await {
        Ok(listener) => Some(listener),
        Err(e) => {
            tracing::warn!(worker_index, error = %e, "failed to start notification listener, falling back to polling only");
            None
        }
    };

    let mut catchup_tick = tokio::time::interval(ctx.config.catchup_interval);
    catchup_tick.tick().await; // first tick fires immediately; consume it

    loop {
        if *shutdown_rx.borrow() {
            return;
        }

        loop {
            if *shutdown_rx.borrow() {
                return;
            }

            let job = match ctx.queue.dequeue().await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(worker_index, error = %e, "dequeue failed");
                    break;
                }
            };

            let logger = JobLogger::new(&job.id, "ingest_job");
            logger.log_start(&job.url);

            match dispatch(&ctx, &job, &cancel_rx).await {
                Ok(()) => logger.log_completion("job succeeded"),
                Err(WorkerError::Db(e)) => logger.log_error(&format!("queue update failed: {e}")),
                Err(e) => logger.log_warning(&format!("job failed: {e}")),
            }
        }

        let fallback = tokio::time::sleep(ctx.config.fallback_poll_interval);
        tokio::pin!(fallback);

        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
            }
            _ = catchup_tick.tick() => {}
            _ = &mut fallback => {}
            notification = recv_notification(&mut listener) => {
                if notification.is_none() {
                    listener = ctx.queue.listen(&ctx.config.notify_channel).await.ok();
                }
            }
        }
    }
}

async fn recv_notification(listener: &mut Option<sqlx::postgres::PgListener>) -> Option<()> {
    match listener {
        Some(listener) => match listener.recv().await {
            Ok(_) => Some(()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}
