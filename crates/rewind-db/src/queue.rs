//! Ingest job queue gateway (C5, §4.5): dequeue contract, retry bookkeeping,
//! notification channel, and per-video advisory locks.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgListener;
use sqlx::{FromRow, PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use rewind_models::{AssetScope, IngestJob, JobId, JobStatus, VideoId};

use crate::error::{DbError, DbResult};
use crate::fnv::advisory_lock_id;

/// Timeout after which a job stuck in `processing` is reclaimed (§9: a
/// conservative default, not derived from a cited source).
pub const STUCK_JOB_TIMEOUT: Duration = Duration::from_secs(600);

/// Reconnect backoff for the notification listener (§9 conservative default).
pub const LISTEN_RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    download_job_id: String,
    video_id: Option<Uuid>,
    url: String,
    extra_args: serde_json::Value,
    info_json_path: Option<String>,
    spool_dir: Option<String>,
    asset_scope: Option<String>,
    refresh: bool,
    archived_by: String,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for IngestJob {
    type Error = DbError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(IngestJob {
            id: JobId::from_uuid(row.id),
            download_job_id: row.download_job_id,
            video_id: row.video_id.map(VideoId::from_uuid),
            url: row.url,
            extra_args: serde_json::from_value(row.extra_args).unwrap_or_default(),
            info_json_path: row.info_json_path,
            spool_dir: row.spool_dir,
            asset_scope: row
                .asset_scope
                .as_deref()
                .and_then(|s| s.parse::<AssetScope>().ok()),
            refresh: row.refresh,
            archived_by: row.archived_by,
            status: row
                .status
                .parse::<JobStatus>()
                .map_err(|_| DbError::JobNotFound(row.id.to_string()))?,
            attempts: row.attempts.max(0) as u32,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
        })
    }
}

#[derive(Clone)]
pub struct JobQueue {
    pool: PgPool,
}

impl JobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init(&self) -> DbResult<()> {
        crate::schema::init_schema(&self.pool).await
    }

    /// Enqueue a new ingest job, e.g. from a completed download handoff.
    pub async fn enqueue(&self, job: &IngestJob) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ingest_jobs
                (id, download_job_id, video_id, url, extra_args, info_json_path,
                 spool_dir, asset_scope, refresh, archived_by, status, attempts,
                 last_error, created_at, updated_at, started_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(job.id.0)
        .bind(&job.download_job_id)
        .bind(job.video_id.map(|v| v.0))
        .bind(&job.url)
        .bind(serde_json::to_value(&job.extra_args)?)
        .bind(&job.info_json_path)
        .bind(&job.spool_dir)
        .bind(job.asset_scope.map(|s| s.as_str().to_string()))
        .bind(job.refresh)
        .bind(&job.archived_by)
        .bind(job.status.as_str())
        .bind(job.attempts as i32)
        .bind(&job.last_error)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.started_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Selects the oldest `queued` job and atomically flips it to
    /// `processing`, incrementing `attempts`. Safe under concurrent callers:
    /// `FOR UPDATE SKIP LOCKED` guarantees no two callers observe the same row.
    pub async fn dequeue(&self) -> DbResult<Option<IngestJob>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE ingest_jobs
            SET status = 'processing',
                attempts = attempts + 1,
                started_at = now(),
                updated_at = now()
            WHERE id = (
                SELECT id FROM ingest_jobs
                WHERE status = 'queued'
                ORDER BY created_at
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(IngestJob::try_from).transpose()
    }

    pub async fn mark_succeeded(&self, id: JobId) -> DbResult<()> {
        sqlx::query("UPDATE ingest_jobs SET status = 'succeeded', updated_at = now() WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: JobId, last_error: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE ingest_jobs SET status = 'failed', last_error = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id.0)
        .bind(last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reset jobs stuck in `processing` beyond `STUCK_JOB_TIMEOUT` back to
    /// `queued` (run on startup and every 2 minutes).
    pub async fn recover_stuck(&self) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET status = 'queued', updated_at = now()
            WHERE status = 'processing'
              AND started_at < now() - $1::interval
            "#,
        )
        .bind(format!("{} seconds", STUCK_JOB_TIMEOUT.as_secs()))
        .execute(&self.pool)
        .await?;

        let affected = result.rows_affected();
        if affected > 0 {
            warn!(count = affected, "recovered stuck jobs");
        }
        Ok(affected)
    }

    /// Transition `queued` jobs whose `attempts >= max_attempts` to `failed`.
    pub async fn fail_excessive_retry(&self, max_attempts: u32) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET status = 'failed',
                last_error = coalesce(last_error, 'exceeded max attempts'),
                updated_at = now()
            WHERE status = 'queued' AND attempts >= $1
            "#,
        )
        .bind(max_attempts as i32)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Try to acquire the per-scope/per-video advisory lock. Holding it
    /// prevents two catchup loops from touching the same video concurrently.
    pub async fn try_advisory_lock(&self, scope: &str, video_id: &str) -> DbResult<bool> {
        let lock_id = advisory_lock_id(scope, video_id);
        let row = sqlx::query("SELECT pg_try_advisory_lock($1) AS acquired")
            .bind(lock_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<bool, _>("acquired")?)
    }

    pub async fn advisory_unlock(&self, scope: &str, video_id: &str) -> DbResult<()> {
        let lock_id = advisory_lock_id(scope, video_id);
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(lock_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Subscribe to `channel`, reconnecting with `LISTEN_RECONNECT_BACKOFF`
    /// between attempts if the listener connection drops.
    pub async fn listen(&self, channel: &str) -> DbResult<PgListener> {
        loop {
            match PgListener::connect_with(&self.pool).await {
                Ok(mut listener) => {
                    if listener.listen(channel).await.is_ok() {
                        return Ok(listener);
                    }
                    warn!(channel, "failed to LISTEN, retrying");
                }
                Err(e) => {
                    warn!(channel, error = %e, "failed to connect listener, retrying");
                }
            }
            tokio::time::sleep(LISTEN_RECONNECT_BACKOFF).await;
        }
    }

    /// Notify `channel`, waking any worker blocked on it.
    pub async fn notify(&self, channel: &str, payload: &str) -> DbResult<()> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn link_download_job(&self, job_id: JobId, video_id: VideoId) -> DbResult<()> {
        sqlx::query("UPDATE ingest_jobs SET video_id = $2, updated_at = now() WHERE id = $1")
            .bind(job_id.0)
            .bind(video_id.0)
            .execute(&self.pool)
            .await?;
        debug!(%job_id, %video_id, "linked ingest job to video");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_row_try_from_rejects_unknown_status() {
        let row = JobRow {
            id: Uuid::nil(),
            download_job_id: "dl".into(),
            video_id: None,
            url: "https://example.test".into(),
            extra_args: serde_json::json!([]),
            info_json_path: None,
            spool_dir: None,
            asset_scope: None,
            refresh: false,
            archived_by: "system".into(),
            status: "bogus".into(),
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
        };
        assert!(IngestJob::try_from(row).is_err());
    }
}
