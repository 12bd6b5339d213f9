//! Schema migrations for the ingest job queue and video catalog.

use sqlx::PgPool;

use crate::error::DbResult;

/// Run all pending migrations under `migrations/`. Idempotent; safe to call
/// on every worker startup.
pub async fn init_schema(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
