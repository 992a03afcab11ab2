//! Engine error taxonomy
//!
//! Callers branch on these variants (conflict dialogs, lock-timeout
//! retries), so they are a typed enum rather than opaque strings. The
//! propagation contract: any error raised before a transaction's first
//! irreversible filesystem step leaves durable state untouched; errors
//! after that step are self-healed internally and only surface as
//! `CrashRecoveryRequired` when recovery itself failed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Precondition failed before anything was mutated
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// A draft is already active for this workbench
    #[error("a draft already exists for this workbench")]
    DraftAlreadyExists,

    /// The operation requires an active draft and none exists
    #[error("no active draft for this workbench")]
    NoDraft,

    /// Restore is blocked while a draft is active
    #[error("a draft exists; publish or discard it before restoring")]
    DraftExists,

    /// Published changed outside the draft lifecycle since draft creation
    #[error("published state changed since the draft was created")]
    PublishConflict,

    /// Not enough free space to complete the operation safely
    #[error("insufficient disk space: need {needed} bytes, {available} available")]
    DiskExhausted { needed: u64, available: u64 },

    /// Lock acquisition exceeded the configured timeout
    #[error("timed out waiting for workbench lock: {0}")]
    LockTimeout(String),

    /// The requested draft revision has been pruned or never recorded
    #[error("draft revision unavailable: {0}")]
    RevisionUnavailable(String),

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("workbench not found: {0}")]
    WorkbenchNotFound(String),

    /// Startup reconciliation failed; mutating commands are refused for
    /// this workbench until an operator intervenes
    #[error("crash recovery required: {0}")]
    CrashRecoveryRequired(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Metadata or filesystem plumbing failure
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
