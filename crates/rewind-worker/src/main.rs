//! Ingest worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rewind_db::identity::PatternUrlExpander;
use rewind_db::queue::JobQueue;
use rewind_db::transcripts::TranscriptStore;
use rewind_db::videos::VideoStore;
use rewind_media::WhisperConfig;
use rewind_worker::pipeline::JobContext;
use rewind_worker::{run_workers, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive("rewind=info".parse().unwrap()))
        .init();

    info!("Starting rewind-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            error!("DATABASE_URL is not set");
            std::process::exit(1);
        }
    };

    let pool = match sqlx::PgPool::connect(&database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    let queue = JobQueue::new(pool.clone());
    if let Err(e) = queue.init().await {
        error!("Failed to run migrations: {}", e);
        std::process::exit(1);
    }

    let ctx = Arc::new(JobContext {
        queue,
        videos: VideoStore::new(pool.clone()),
        transcripts: TranscriptStore::new(pool),
        config,
        whisper: WhisperConfig::from_env(),
        url_expander: Arc::new(PatternUrlExpander),
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let shutdown_handle = tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        shutdown_tx.send(true).ok();
    });

    run_workers(ctx, shutdown_rx).await;
    shutdown_handle.await.ok();

    info!("worker shutdown complete");
}
