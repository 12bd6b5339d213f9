//! Shared data models for the Rewind ingest pipeline.
//!
//! Pure types only — no I/O. Everything here is produced or consumed by the
//! media adapter, asset layout manager, queue gateway, and worker pool.

pub mod assets;
pub mod job;
pub mod manifest;
pub mod video;

pub use assets::AssetsStatus;
pub use job::{AssetScope, IngestJob, JobId, JobStatus};
pub use manifest::{
    SeekLevel, SeekManifest, WaveformManifest, SEEK_MANIFEST_FORMAT, WAVEFORM_MANIFEST_FORMAT,
};
pub use video::{Revision, Video, VideoId, NAMESPACE_REWIND};
