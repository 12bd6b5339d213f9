//! Video catalog gateway: fetch, insert, and upsert against the `videos`
//! table backing the identity resolver (C8) and asset-status updates (C4).

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use rewind_models::{AssetsStatus, Video, VideoId};

use crate::error::{DbError, DbResult};

#[derive(Debug, FromRow)]
struct VideoRow {
    id: uuid::Uuid,
    src: String,
    title: String,
    description: String,
    tags: Value,
    uploader_id: Option<String>,
    channel_id: Option<String>,
    upload_date: Option<String>,
    duration_s: Option<f64>,
    view_count: Option<i64>,
    like_count: Option<i64>,
    info_blob: Value,
    comments_blob: Option<Value>,
    video_path: Option<String>,
    thumbnail_path: Option<String>,
    file_hash: Option<String>,
    file_size: Option<i64>,
    probe_blob: Option<Value>,
    assets_status: Value,
    thumb_gradient_start: Option<String>,
    thumb_gradient_end: Option<String>,
    thumb_gradient_angle: Option<f64>,
    archived_by: Option<String>,
    revisions: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VideoRow> for Video {
    type Error = DbError;

    fn try_from(row: VideoRow) -> Result<Self, Self::Error> {
        Ok(Video {
            id: VideoId::from_uuid(row.id),
            src: row.src,
            title: row.title,
            description: row.description,
            tags: serde_json::from_value(row.tags).unwrap_or_default(),
            uploader_id: row.uploader_id,
            channel_id: row.channel_id,
            upload_date: row.upload_date,
            duration_s: row.duration_s,
            view_count: row.view_count,
            like_count: row.like_count,
            info_blob: row.info_blob,
            comments_blob: row.comments_blob,
            video_path: row.video_path,
            thumbnail_path: row.thumbnail_path,
            file_hash: row.file_hash,
            file_size: row.file_size,
            probe_blob: row.probe_blob,
            assets_status: serde_json::from_value(row.assets_status).unwrap_or_default(),
            thumb_gradient_start: row.thumb_gradient_start,
            thumb_gradient_end: row.thumb_gradient_end,
            thumb_gradient_angle: row.thumb_gradient_angle.map(|a| a as i32),
            archived_by: row.archived_by.unwrap_or_default(),
            revisions: serde_json::from_value(row.revisions).unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct VideoStore {
    pool: PgPool,
}

impl VideoStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn fetch(&self, id: VideoId) -> DbResult<Option<Video>> {
        let row = sqlx::query_as::<_, VideoRow>("SELECT * FROM videos WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Video::try_from).transpose()
    }

    pub async fn fetch_by_src(&self, src: &str) -> DbResult<Option<Video>> {
        let row = sqlx::query_as::<_, VideoRow>("SELECT * FROM videos WHERE src = $1")
            .bind(src)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Video::try_from).transpose()
    }

    /// Insert a brand-new row, or update an existing one in place. Identity
    /// (which branch, and `src`/`video_path`/etc. preservation) is decided
    /// by the caller via [`crate::identity`]; this is a plain upsert on `id`.
    pub async fn upsert(&self, video: &Video) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO videos (
                id, src, title, description, tags, uploader_id, channel_id,
                upload_date, duration_s, view_count, like_count, info_blob,
                comments_blob, video_path, thumbnail_path, file_hash, file_size,
                probe_blob, assets_status, thumb_gradient_start, thumb_gradient_end,
                thumb_gradient_angle, archived_by, revisions, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26
            )
            ON CONFLICT (id) DO UPDATE SET
                src = EXCLUDED.src,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                tags = EXCLUDED.tags,
                uploader_id = EXCLUDED.uploader_id,
                channel_id = EXCLUDED.channel_id,
                upload_date = EXCLUDED.upload_date,
                duration_s = EXCLUDED.duration_s,
                view_count = EXCLUDED.view_count,
                like_count = EXCLUDED.like_count,
                info_blob = EXCLUDED.info_blob,
                comments_blob = EXCLUDED.comments_blob,
                video_path = EXCLUDED.video_path,
                thumbnail_path = EXCLUDED.thumbnail_path,
                file_hash = EXCLUDED.file_hash,
                file_size = EXCLUDED.file_size,
                probe_blob = EXCLUDED.probe_blob,
                assets_status = EXCLUDED.assets_status,
                thumb_gradient_start = EXCLUDED.thumb_gradient_start,
                thumb_gradient_end = EXCLUDED.thumb_gradient_end,
                thumb_gradient_angle = EXCLUDED.thumb_gradient_angle,
                archived_by = EXCLUDED.archived_by,
                revisions = EXCLUDED.revisions,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(video.id.0)
        .bind(&video.src)
        .bind(&video.title)
        .bind(&video.description)
        .bind(serde_json::to_value(&video.tags)?)
        .bind(&video.uploader_id)
        .bind(&video.channel_id)
        .bind(&video.upload_date)
        .bind(video.duration_s)
        .bind(video.view_count)
        .bind(video.like_count)
        .bind(&video.info_blob)
        .bind(&video.comments_blob)
        .bind(&video.video_path)
        .bind(&video.thumbnail_path)
        .bind(&video.file_hash)
        .bind(video.file_size)
        .bind(&video.probe_blob)
        .bind(serde_json::to_value(&video.assets_status)?)
        .bind(&video.thumb_gradient_start)
        .bind(&video.thumb_gradient_end)
        .bind(video.thumb_gradient_angle.map(|a| a as f64))
        .bind(&video.archived_by)
        .bind(serde_json::to_value(&video.revisions)?)
        .bind(video.created_at)
        .bind(video.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_assets_status(&self, id: VideoId, status: &AssetsStatus) -> DbResult<()> {
        sqlx::query("UPDATE videos SET assets_status = $2, updated_at = now() WHERE id = $1")
            .bind(id.0)
            .bind(serde_json::to_value(status)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Up to `limit` videos whose `assets_status` still has a `false` entry
    /// somewhere, oldest-updated first (bounded catchup unit, §4.7).
    pub async fn list_incomplete(&self, limit: i64) -> DbResult<Vec<VideoId>> {
        let rows: Vec<(uuid::Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM videos
            WHERE assets_status::text LIKE '%false%'
            ORDER BY updated_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| VideoId::from_uuid(id)).collect())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
