//! Workbench transaction engine
//!
//! Maintains a crash-safe, versioned file store per workbench, split into
//! an approved published tree and a single mutable draft. Provides:
//! - Draft lifecycle (create from published, discard)
//! - Atomic publish with conflict detection and rollback
//! - Named restorable checkpoints with retention pruning
//! - Message-level draft revision undo
//! - Startup reconciliation driven by a transaction marker
//!
//! Everything is built on ordinary filesystem primitives: hardlink/copy
//! snapshots, write-temp-then-rename metadata, and single-rename
//! directory swaps.

pub mod audit;
pub mod checkpoint;
pub mod config;
pub mod draft;
pub mod error;
pub mod layout;
pub mod ledger;
pub mod lock;
pub mod manifest;
pub mod progress;
pub mod publish;
pub mod recovery;
pub mod revision;
pub mod workbench;

// Re-exports
pub use audit::{AuditEvent, AuditEventKind};
pub use checkpoint::{CheckpointMeta, CheckpointReason, CheckpointStats, CheckpointStore};
pub use config::{DiskPressurePolicy, EngineConfig};
pub use draft::{DraftManager, DraftState};
pub use error::{EngineError, Result};
pub use layout::WorkbenchLayout;
pub use lock::{LockTable, WorkbenchGuard};
pub use ledger::{TransactionKind, TransactionMarker};
pub use manifest::{FileManifest, ManifestEntry};
pub use progress::{NullProgress, Phase, ProgressSink};
pub use publish::{PublishCoordinator, PublishOutcome};
pub use recovery::recover_workbench;
pub use revision::{RevisionRecord, RevisionStore};
pub use workbench::{Workbench, WorkbenchManager};

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System time before UNIX epoch")
        .as_millis() as u64
}
