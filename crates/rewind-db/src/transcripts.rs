//! Transcript persistence: upsert the parsed text alongside the raw VTT
//! (§4.3's last bullet), keyed by `(video_id, lang)`.

use sqlx::PgPool;

use rewind_models::VideoId;

use crate::error::DbResult;

#[derive(Clone)]
pub struct TranscriptStore {
    pool: PgPool,
}

impl TranscriptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(
        &self,
        video_id: VideoId,
        lang: &str,
        format: &str,
        text: &str,
        raw: &str,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transcripts (video_id, lang, format, text, raw, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, now(), now())
            ON CONFLICT (video_id, lang) DO UPDATE SET
                format = EXCLUDED.format,
                text = EXCLUDED.text,
                raw = EXCLUDED.raw,
                updated_at = now()
            "#,
        )
        .bind(video_id.0)
        .bind(lang)
        .bind(format)
        .bind(text)
        .bind(raw)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
