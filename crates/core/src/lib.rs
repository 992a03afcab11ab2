//! Workbench Core - Filesystem primitives for the workbench engine
//!
//! This crate provides the foundational filesystem layer:
//! - Snapshot materialization (hardlink-first tree copies with staged commit)
//! - Directory fingerprinting (path + size + mtime hash)
//! - Atomic JSON metadata read/write
//! - Directory stats and free-space probing

pub mod fingerprint;
pub mod fsutil;
pub mod snapshot;

// Re-export main types for convenience
pub use fingerprint::{fingerprint_dir, Fingerprint};
pub use fsutil::{
    available_space, dir_stats, read_json, read_json_opt, remove_dir_if_exists,
    remove_file_if_exists, write_json_atomic, DirStats,
};
pub use snapshot::{materialize, materialize_into, SnapshotMode};

/// Common result type used throughout workbench-core
pub type Result<T> = anyhow::Result<T>;
