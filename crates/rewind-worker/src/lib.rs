#![deny(unreachable_patterns)]
//! Ingest worker pool.
//!
//! This crate provides:
//! - Job classification and dispatch (ingest / regeneration / format merge)
//! - The asset-generation pipeline, in strict per-job order
//! - A pool of independent worker loops with a per-worker recovery scheduler
//! - Structured job logging and graceful shutdown

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod pool;
pub mod recovery;
pub mod retry;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use pipeline::{dispatch, JobContext};
pub use pool::run_workers;
