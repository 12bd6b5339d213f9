//! Postgres-backed ingest job queue, video catalog, and identity resolver.
//!
//! Three gateways share one pool: [`queue::JobQueue`] (C5, dequeue contract,
//! retry bookkeeping, LISTEN/NOTIFY, advisory locks), [`videos::VideoStore`]
//! (catalog reads/writes), and [`identity`] (C8, URL normalization and
//! dedup).

pub mod error;
pub mod fnv;
pub mod identity;
pub mod queue;
pub mod schema;
pub mod transcripts;
pub mod videos;

pub use error::{DbError, DbResult};
pub use fnv::{advisory_lock_id, fnv1a64};
pub use identity::{
    assign_id, candidate_urls, canonical_domain, canonicalize_url, maybe_append_revision,
    resolve_existing, PatternUrlExpander, UrlExpander,
};
pub use queue::{JobQueue, LISTEN_RECONNECT_BACKOFF, STUCK_JOB_TIMEOUT};
pub use schema::init_schema;
pub use transcripts::TranscriptStore;
pub use videos::VideoStore;
