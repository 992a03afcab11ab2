//! Draft revision store
//!
//! An internal snapshot ring for message-level undo. After every
//! successful draft mutation the caller records a revision keyed to its
//! conversation head pointer; rewinding to that pointer swaps the
//! snapshot back in. Revisions also record "no draft existed here"
//! (`has_draft = false`), so rewinding past the draft's creation deletes
//! it. Revisions are never exposed as user-facing checkpoints and die
//! with their draft.

use crate::config::EngineConfig;
use crate::draft::DraftState;
use crate::error::{EngineError, Result};
use crate::layout::WorkbenchLayout;
use crate::now_ms;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use ulid::Ulid;
use workbench_core::{
    materialize_into, read_json_opt, remove_dir_if_exists, remove_file_if_exists,
    write_json_atomic, SnapshotMode,
};

/// Record stored at `meta/draft_revisions/<rev_id>/rev.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub revision_id: String,
    pub head_pointer: String,
    /// Monotonic per-workbench ordering of snapshots
    pub seq: u64,
    pub created_at_ms: u64,
    pub has_draft: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_id: Option<Ulid>,
}

pub struct RevisionStore {
    layout: WorkbenchLayout,
    config: EngineConfig,
}

/// Revision ids are derived from the head pointer, so re-snapshotting the
/// same point replaces the earlier revision instead of accumulating.
pub fn revision_id_for(head_pointer: &str) -> String {
    let digest = Sha256::digest(head_pointer.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(out, "{:02x}", b);
    }
    out
}

impl RevisionStore {
    pub fn new(layout: WorkbenchLayout, config: EngineConfig) -> Self {
        Self { layout, config }
    }

    /// Record the current draft state (or its absence) at `head_pointer`.
    pub fn snapshot(&self, head_pointer: &str) -> Result<RevisionRecord> {
        let head_pointer = head_pointer.trim();
        if head_pointer.is_empty() {
            return Err(EngineError::ValidationFailed(
                "head pointer is required".to_string(),
            ));
        }
        let rev_id = revision_id_for(head_pointer);
        let draft_state: Option<DraftState> = read_json_opt(&self.layout.draft_file())?;

        let record = RevisionRecord {
            revision_id: rev_id.clone(),
            head_pointer: head_pointer.to_string(),
            seq: self.next_seq()?,
            created_at_ms: now_ms(),
            has_draft: draft_state.is_some(),
            draft_id: draft_state.as_ref().map(|s| s.draft_id),
        };

        let staging = self.layout.revision_staging(&rev_id);
        remove_dir_if_exists(&staging)?;
        if let Err(e) = self.build_revision(&staging, &record) {
            let _ = remove_dir_if_exists(&staging);
            return Err(e);
        }

        let final_dir = self.layout.revision_dir(&rev_id);
        remove_dir_if_exists(&final_dir)?;
        if let Err(e) = fs::rename(&staging, &final_dir) {
            let _ = remove_dir_if_exists(&staging);
            return Err(e.into());
        }

        tracing::debug!(
            "revision.snapshot workbench={} head={} seq={}",
            self.layout.root().display(),
            head_pointer,
            record.seq
        );
        self.apply_retention()?;
        Ok(record)
    }

    fn build_revision(&self, staging: &std::path::Path, record: &RevisionRecord) -> Result<()> {
        fs::create_dir_all(staging)?;
        if record.has_draft {
            let snapshot = staging.join("draft_snapshot");
            fs::create_dir_all(&snapshot)?;
            if self.layout.draft().is_dir() {
                // Byte copy: the draft keeps being edited in place after
                // this snapshot, and links would let those edits bleed in.
                materialize_into(&self.layout.draft(), &snapshot, SnapshotMode::Copy)?;
            }
            fs::copy(self.layout.draft_file(), staging.join("draft.json"))?;
        }
        write_json_atomic(&staging.join("rev.json"), record)?;
        Ok(())
    }

    /// Rewind the draft to the revision recorded at `head_pointer`.
    ///
    /// A `has_draft = false` revision deletes the draft (the pointer
    /// predates its creation). A missing revision fails with
    /// `RevisionUnavailable`; the caller decides between a history-only
    /// rewind and discarding the draft.
    pub fn restore_to(&self, head_pointer: &str) -> Result<RevisionRecord> {
        let rev_id = revision_id_for(head_pointer.trim());
        let record: RevisionRecord = read_json_opt(&self.layout.revision_record_file(&rev_id))?
            .ok_or_else(|| {
                EngineError::RevisionUnavailable(format!(
                    "no revision recorded at {head_pointer} (pruned or never snapshotted)"
                ))
            })?;

        if !record.has_draft {
            remove_dir_if_exists(&self.layout.draft())?;
            remove_file_if_exists(&self.layout.draft_file())?;
            tracing::info!(
                "revision.restore workbench={} head={} (pre-draft point, draft removed)",
                self.layout.root().display(),
                head_pointer
            );
            return Ok(record);
        }

        let snapshot = self.layout.revision_draft_snapshot(&rev_id);
        if !snapshot.is_dir() {
            return Err(EngineError::RevisionUnavailable(format!(
                "revision at {head_pointer} has no draft snapshot"
            )));
        }

        let staging = self.layout.draft_restore_staging();
        remove_dir_if_exists(&staging)?;
        fs::create_dir_all(&staging)?;
        if let Err(e) = materialize_into(&snapshot, &staging, SnapshotMode::Copy) {
            let _ = remove_dir_if_exists(&staging);
            return Err(e.into());
        }

        remove_dir_if_exists(&self.layout.draft())?;
        if let Err(e) = fs::rename(&staging, self.layout.draft()) {
            let _ = remove_dir_if_exists(&staging);
            return Err(e.into());
        }
        // Bring the draft record back in step with the restored tree.
        let draft_record: DraftState =
            workbench_core::read_json(&self.layout.revision_draft_record(&rev_id))?;
        write_json_atomic(&self.layout.draft_file(), &draft_record)?;

        tracing::info!(
            "revision.restore workbench={} head={} seq={}",
            self.layout.root().display(),
            head_pointer,
            record.seq
        );
        Ok(record)
    }

    /// All revision records, oldest first.
    pub fn list(&self) -> Result<Vec<RevisionRecord>> {
        let dir = self.layout.revisions_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for entry in entries.flatten() {
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let rev_json = entry.path().join("rev.json");
            if let Ok(Some(record)) = read_json_opt::<RevisionRecord>(&rev_json) {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.seq);
        Ok(records)
    }

    /// Remove every revision. Called when the draft is published or
    /// discarded — revisions do not outlive their draft.
    pub fn prune_all(&self) -> Result<()> {
        remove_dir_if_exists(&self.layout.revisions_dir())?;
        Ok(())
    }

    fn next_seq(&self) -> Result<u64> {
        Ok(self.list()?.last().map(|r| r.seq + 1).unwrap_or(0))
    }

    /// Keep the newest `max_draft_revisions` by sequence.
    fn apply_retention(&self) -> Result<()> {
        let records = self.list()?;
        let keep = self.config.max_draft_revisions;
        if records.len() <= keep {
            return Ok(());
        }
        let excess = records.len() - keep;
        for record in records.into_iter().take(excess) {
            remove_dir_if_exists(&self.layout.revision_dir(&record.revision_id))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::DraftManager;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, WorkbenchLayout, RevisionStore, DraftManager) {
        let temp = TempDir::new().unwrap();
        let layout = WorkbenchLayout::new(temp.path());
        fs::create_dir_all(layout.published()).unwrap();
        fs::write(layout.published().join("a.txt"), "v1").unwrap();
        let store = RevisionStore::new(layout.clone(), EngineConfig::default());
        let drafts = DraftManager::new(layout.clone());
        (temp, layout, store, drafts)
    }

    #[test]
    fn test_snapshot_without_draft_records_absence() {
        let (_temp, _layout, store, _drafts) = setup();
        let record = store.snapshot("msg-1").unwrap();
        assert!(!record.has_draft);
        assert!(record.draft_id.is_none());
    }

    #[test]
    fn test_snapshot_and_restore_draft_content() {
        let (_temp, layout, store, drafts) = setup();
        drafts.create("test").unwrap();

        fs::write(layout.draft().join("a.txt"), "edit-1").unwrap();
        store.snapshot("msg-1").unwrap();

        fs::write(layout.draft().join("a.txt"), "edit-2").unwrap();
        store.snapshot("msg-2").unwrap();

        let record = store.restore_to("msg-1").unwrap();
        assert!(record.has_draft);
        assert_eq!(
            fs::read_to_string(layout.draft().join("a.txt")).unwrap(),
            "edit-1"
        );
        // Draft record restored alongside the tree
        assert!(layout.draft_file().exists());
    }

    #[test]
    fn test_restore_to_pre_draft_point_deletes_draft() {
        let (_temp, layout, store, drafts) = setup();
        store.snapshot("msg-0").unwrap();

        drafts.create("test").unwrap();
        fs::write(layout.draft().join("a.txt"), "edit").unwrap();
        store.snapshot("msg-1").unwrap();

        store.restore_to("msg-0").unwrap();
        assert!(!layout.draft().exists());
        assert!(!layout.draft_file().exists());
    }

    #[test]
    fn test_restore_unknown_pointer_fails() {
        let (_temp, _layout, store, _drafts) = setup();
        assert!(matches!(
            store.restore_to("never-seen"),
            Err(EngineError::RevisionUnavailable(_))
        ));
    }

    #[test]
    fn test_re_snapshot_same_pointer_replaces() {
        let (_temp, layout, store, drafts) = setup();
        drafts.create("test").unwrap();

        fs::write(layout.draft().join("a.txt"), "first").unwrap();
        store.snapshot("msg-1").unwrap();
        fs::write(layout.draft().join("a.txt"), "second").unwrap();
        store.snapshot("msg-1").unwrap();

        fs::write(layout.draft().join("a.txt"), "other").unwrap();
        store.restore_to("msg-1").unwrap();
        assert_eq!(
            fs::read_to_string(layout.draft().join("a.txt")).unwrap(),
            "second"
        );
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_retention_prunes_oldest() {
        let (_temp, _layout, store, drafts) = setup();
        let mut config = EngineConfig::default();
        config.max_draft_revisions = 2;
        let store = RevisionStore::new(store.layout.clone(), config);
        drafts.create("test").unwrap();

        store.snapshot("msg-1").unwrap();
        store.snapshot("msg-2").unwrap();
        store.snapshot("msg-3").unwrap();

        let records = store.list().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].head_pointer, "msg-2");
        assert_eq!(records[1].head_pointer, "msg-3");

        assert!(matches!(
            store.restore_to("msg-1"),
            Err(EngineError::RevisionUnavailable(_))
        ));
    }

    #[test]
    fn test_prune_all() {
        let (_temp, layout, store, drafts) = setup();
        drafts.create("test").unwrap();
        store.snapshot("msg-1").unwrap();
        store.prune_all().unwrap();
        assert!(!layout.revisions_dir().exists());
        assert!(store.list().unwrap().is_empty());
    }
}
