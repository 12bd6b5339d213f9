//! Canonical on-disk asset layout, legacy migration and read-only
//! asset-status verification (C2, C4).

pub mod canonical;
pub mod error;
pub mod spool;
pub mod status;

pub use canonical::{
    canonical_dir, ensure_canonical_dir, hash_file, migrate_legacy_directory, place_from_spool,
    CanonicalPlacement,
};
pub use error::{LayoutError, LayoutResult};
pub use spool::{scan_spool, vtt_language_tag, SpoolContents, SpoolEntry};
pub use status::verify;
