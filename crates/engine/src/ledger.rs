//! Transaction ledger
//!
//! A single marker file (`meta/transaction.json`) names the multi-step
//! operation in flight. It is written with write-temp-then-rename so it is
//! never observed half-written, and deleted as the final step of the
//! transaction. Its presence at startup is the one source of truth that
//! the previous session died mid-transaction.

use crate::error::{EngineError, Result};
use crate::layout::WorkbenchLayout;
use crate::now_ms;
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use workbench_core::{read_json_opt, remove_file_if_exists, write_json_atomic};

/// Operation named by a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Publish,
    Restore,
}

/// On-disk record of an in-flight publish or restore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionMarker {
    pub kind: TransactionKind,
    pub created_at_ms: u64,
    /// Draft being published (publish only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_id: Option<Ulid>,
    /// Checkpoint being restored (restore), or the pre-publish checkpoint (publish)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<Ulid>,
    /// Name of the aside path under the workbench root
    pub aside: String,
    /// Name of the staging path under the workbench root (restore only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging: Option<String>,
}

impl TransactionMarker {
    pub fn publish(draft_id: Ulid, pre_publish_checkpoint: Ulid) -> Self {
        Self {
            kind: TransactionKind::Publish,
            created_at_ms: now_ms(),
            draft_id: Some(draft_id),
            checkpoint_id: Some(pre_publish_checkpoint),
            aside: "published.prev".to_string(),
            staging: None,
        }
    }

    pub fn restore(checkpoint_id: Ulid) -> Self {
        Self {
            kind: TransactionKind::Restore,
            created_at_ms: now_ms(),
            draft_id: None,
            checkpoint_id: Some(checkpoint_id),
            aside: "published.prev".to_string(),
            staging: Some("published.restore-staging".to_string()),
        }
    }
}

/// Record a transaction as in flight. Refuses if one is already pending;
/// the lock serializes writers, so a pending marker here means an earlier
/// transaction never completed and recovery has not run.
pub fn begin(layout: &WorkbenchLayout, marker: &TransactionMarker) -> Result<()> {
    if read_pending(layout)?.is_some() {
        return Err(EngineError::CrashRecoveryRequired(
            "a transaction marker is already pending".to_string(),
        ));
    }
    write_json_atomic(&layout.transaction_file(), marker)?;
    Ok(())
}

/// Mark the transaction complete by deleting the marker.
pub fn commit(layout: &WorkbenchLayout) -> Result<()> {
    remove_file_if_exists(&layout.transaction_file())?;
    Ok(())
}

/// Read the pending marker, if any.
pub fn read_pending(layout: &WorkbenchLayout) -> Result<Option<TransactionMarker>> {
    Ok(read_json_opt(&layout.transaction_file())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_begin_read_commit() {
        let temp = TempDir::new().unwrap();
        let layout = WorkbenchLayout::new(temp.path());

        assert!(read_pending(&layout).unwrap().is_none());

        let marker = TransactionMarker::publish(Ulid::new(), Ulid::new());
        begin(&layout, &marker).unwrap();

        let pending = read_pending(&layout).unwrap().unwrap();
        assert_eq!(pending.kind, TransactionKind::Publish);
        assert_eq!(pending.draft_id, marker.draft_id);

        commit(&layout).unwrap();
        assert!(read_pending(&layout).unwrap().is_none());
    }

    #[test]
    fn test_begin_refuses_double_entry() {
        let temp = TempDir::new().unwrap();
        let layout = WorkbenchLayout::new(temp.path());

        begin(&layout, &TransactionMarker::restore(Ulid::new())).unwrap();
        let second = begin(&layout, &TransactionMarker::restore(Ulid::new()));
        assert!(matches!(
            second,
            Err(EngineError::CrashRecoveryRequired(_))
        ));
    }

    #[test]
    fn test_commit_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let layout = WorkbenchLayout::new(temp.path());

        commit(&layout).unwrap();
        begin(&layout, &TransactionMarker::restore(Ulid::new())).unwrap();
        commit(&layout).unwrap();
        commit(&layout).unwrap();
    }
}
