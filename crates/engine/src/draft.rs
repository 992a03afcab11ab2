//! Draft lifecycle
//!
//! At most one draft exists per workbench. It is materialized from the
//! published tree and carries the fingerprint published had at that
//! moment; the publish conflict check compares against it later. The
//! draft directory and its metadata record always agree — partial states
//! from a crash are reconciled at startup before any command runs.

use crate::error::{EngineError, Result};
use crate::layout::WorkbenchLayout;
use crate::now_ms;
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use workbench_core::{
    fingerprint_dir, materialize, read_json_opt, remove_dir_if_exists, remove_file_if_exists,
    write_json_atomic, Fingerprint, SnapshotMode,
};

/// Record stored at `meta/draft.json` while a draft is active
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftState {
    pub draft_id: Ulid,
    pub created_at_ms: u64,
    /// Who or what created the draft (user action, agent run id)
    pub source: String,
    /// Fingerprint of published at draft creation; the conflict baseline
    pub published_fingerprint: Fingerprint,
}

pub struct DraftManager {
    layout: WorkbenchLayout,
}

impl DraftManager {
    pub fn new(layout: WorkbenchLayout) -> Self {
        Self { layout }
    }

    /// The active draft record, if any.
    pub fn state(&self) -> Result<Option<DraftState>> {
        Ok(read_json_opt(&self.layout.draft_file())?)
    }

    /// Create the draft from published. Fails with `DraftAlreadyExists`
    /// when one is active.
    pub fn create(&self, source: &str) -> Result<DraftState> {
        if self.state()?.is_some() {
            return Err(EngineError::DraftAlreadyExists);
        }
        // A directory without a record is a leftover from an interrupted
        // create; recovery normally clears it, but clear it here too so
        // materialize starts clean.
        if self.layout.draft().exists() {
            tracing::warn!(
                "Clearing orphaned draft directory for {}",
                self.layout.root().display()
            );
            remove_dir_if_exists(&self.layout.draft())?;
        }

        let published_fingerprint = fingerprint_dir(&self.layout.published())?;
        // The draft is edited in place by collaborators; a hardlinked tree
        // would let those edits reach published through the shared inode.
        materialize(
            &self.layout.published(),
            &self.layout.draft(),
            SnapshotMode::Copy,
        )?;

        let state = DraftState {
            draft_id: Ulid::new(),
            created_at_ms: now_ms(),
            source: source.to_string(),
            published_fingerprint,
        };
        if let Err(e) = write_json_atomic(&self.layout.draft_file(), &state) {
            // Keep directory and record in agreement
            let _ = remove_dir_if_exists(&self.layout.draft());
            return Err(e.into());
        }
        tracing::info!(
            "draft.create workbench={} draft={}",
            self.layout.root().display(),
            state.draft_id
        );
        Ok(state)
    }

    /// Remove the draft directory and record. Published is untouched and
    /// no checkpoint is created. The caller prunes draft revisions.
    pub fn discard(&self) -> Result<DraftState> {
        let state = self.state()?.ok_or(EngineError::NoDraft)?;
        remove_dir_if_exists(&self.layout.draft())?;
        remove_file_if_exists(&self.layout.draft_file())?;
        tracing::info!(
            "draft.discard workbench={} draft={}",
            self.layout.root().display(),
            state.draft_id
        );
        Ok(state)
    }

    /// Fingerprint of published as it is right now. Compared against the
    /// draft's captured fingerprint by the conflict check.
    pub fn current_fingerprint(&self) -> Result<Fingerprint> {
        Ok(fingerprint_dir(&self.layout.published())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, WorkbenchLayout) {
        let temp = TempDir::new().unwrap();
        let layout = WorkbenchLayout::new(temp.path());
        fs::create_dir_all(layout.published()).unwrap();
        fs::write(layout.published().join("a.txt"), "v1").unwrap();
        (temp, layout)
    }

    #[test]
    fn test_create_copies_published() {
        let (_temp, layout) = setup();
        let drafts = DraftManager::new(layout.clone());

        let state = drafts.create("test").unwrap();
        assert_eq!(
            fs::read_to_string(layout.draft().join("a.txt")).unwrap(),
            "v1"
        );
        assert_eq!(drafts.state().unwrap().unwrap().draft_id, state.draft_id);
    }

    #[test]
    fn test_create_twice_fails() {
        let (_temp, layout) = setup();
        let drafts = DraftManager::new(layout);

        drafts.create("test").unwrap();
        assert!(matches!(
            drafts.create("test"),
            Err(EngineError::DraftAlreadyExists)
        ));
    }

    #[test]
    fn test_discard_removes_dir_and_record() {
        let (_temp, layout) = setup();
        let drafts = DraftManager::new(layout.clone());

        drafts.create("test").unwrap();
        drafts.discard().unwrap();

        assert!(!layout.draft().exists());
        assert!(!layout.draft_file().exists());
        assert!(drafts.state().unwrap().is_none());
    }

    #[test]
    fn test_discard_without_draft_fails() {
        let (_temp, layout) = setup();
        let drafts = DraftManager::new(layout);
        assert!(matches!(drafts.discard(), Err(EngineError::NoDraft)));
    }

    #[test]
    fn test_fingerprint_tracks_external_change() {
        let (_temp, layout) = setup();
        let drafts = DraftManager::new(layout.clone());

        let state = drafts.create("test").unwrap();
        assert_eq!(
            drafts.current_fingerprint().unwrap(),
            state.published_fingerprint
        );

        fs::write(layout.published().join("b.txt"), "external").unwrap();
        assert_ne!(
            drafts.current_fingerprint().unwrap(),
            state.published_fingerprint
        );
    }

    #[test]
    fn test_discard_leaves_published_alone() {
        let (_temp, layout) = setup();
        let drafts = DraftManager::new(layout.clone());

        drafts.create("test").unwrap();
        fs::write(layout.draft().join("a.txt"), "v2").unwrap();
        drafts.discard().unwrap();

        assert_eq!(
            fs::read_to_string(layout.published().join("a.txt")).unwrap(),
            "v1"
        );
    }
}
