//! Publish coordinator
//!
//! Drives the draft → published swap as a state machine:
//!
//! ```text
//! NoDraft → DraftReady → Publishing → NoDraft          (success)
//!                        Publishing → RollingBack → DraftReady   (failure)
//! ```
//!
//! `Publishing` is transient and is never the state observed across a
//! crash: everything before the directory swap can abort with published
//! and draft untouched, and everything after it is finish-work that
//! startup recovery can replay. The swap itself is two renames — one per
//! side — so each step is atomic on the underlying filesystem.

use crate::checkpoint::{CheckpointReason, CheckpointStore};
use crate::config::EngineConfig;
use crate::draft::DraftManager;
use crate::error::{EngineError, Result};
use crate::layout::WorkbenchLayout;
use crate::ledger::{self, TransactionMarker};
use crate::manifest::{delete_scratch_files, FileManifest};
use crate::progress::{Phase, ProgressSink};
use crate::revision::RevisionStore;
use crate::{audit, now_ms, workbench};
use serde::Serialize;
use std::fs;
use ulid::Ulid;
use workbench_core::{available_space, dir_stats, remove_dir_if_exists, remove_file_if_exists};

/// Result of a successful publish
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub checkpoint_id: Ulid,
    pub published_at_ms: u64,
}

pub struct PublishCoordinator {
    layout: WorkbenchLayout,
    config: EngineConfig,
}

impl PublishCoordinator {
    pub fn new(layout: WorkbenchLayout, config: EngineConfig) -> Self {
        Self { layout, config }
    }

    /// Atomically promote the draft to published.
    ///
    /// Any failure before the swap returns with published and draft
    /// byte-for-byte untouched. Failures after the swap are finish-work:
    /// they are healed here or by the next startup, never reported as a
    /// failed publish.
    pub fn publish(&self, progress: &dyn ProgressSink) -> Result<PublishOutcome> {
        let drafts = DraftManager::new(self.layout.clone());
        let checkpoints = CheckpointStore::new(self.layout.clone(), self.config.clone());

        // validating
        progress.phase(Phase::Validating);
        let draft_state = drafts.state()?.ok_or(EngineError::NoDraft)?;
        self.ensure_free_space()?;

        // conflict_check: published must still match what the draft was
        // cut from. On mismatch the caller chooses between discarding the
        // draft and restoring a checkpoint; nothing is mutated here.
        progress.phase(Phase::ConflictCheck);
        if drafts.current_fingerprint()? != draft_state.published_fingerprint {
            return Err(EngineError::PublishConflict);
        }

        // checkpoint_pre_publish: the undo path for "undo publish"
        progress.phase(Phase::CheckpointPrePublish);
        let checkpoint = checkpoints.create(
            CheckpointReason::Publish,
            Some("Before publish".to_string()),
        )?;

        ledger::begin(
            &self.layout,
            &TransactionMarker::publish(draft_state.draft_id, checkpoint.checkpoint_id),
        )?;

        // swap_directories: the single irreversible step
        progress.phase(Phase::SwapDirectories);
        let published = self.layout.published();
        let prev = self.layout.published_prev();
        if let Err(e) = remove_dir_if_exists(&prev) {
            progress.phase(Phase::RollingBack);
            let _ = ledger::commit(&self.layout);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&published, &prev) {
            progress.phase(Phase::RollingBack);
            let _ = ledger::commit(&self.layout);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(self.layout.draft(), &published) {
            // The first rename is still reversible; put published back
            // and leave the draft exactly as it was.
            progress.phase(Phase::RollingBack);
            let _ = fs::rename(&prev, &published);
            let _ = ledger::commit(&self.layout);
            return Err(e.into());
        }

        // finalizing: cleanup only. The swap has landed; if any of this
        // fails the marker stays behind and startup recovery finishes it.
        progress.phase(Phase::Finalizing);
        let published_at_ms = now_ms();
        if let Err(e) = self.finalize(draft_state.draft_id, checkpoint.checkpoint_id) {
            tracing::error!(
                "publish finalize deferred to startup recovery for {}: {}",
                self.layout.root().display(),
                e
            );
        } else {
            tracing::info!(
                "draft.publish workbench={} draft={} checkpoint={}",
                self.layout.root().display(),
                draft_state.draft_id,
                checkpoint.checkpoint_id
            );
        }

        Ok(PublishOutcome {
            checkpoint_id: checkpoint.checkpoint_id,
            published_at_ms,
        })
    }

    /// Finish a publish whose swap has landed. Safe to re-run; every step
    /// is a delete, an overwrite, or a monotonic bump.
    pub(crate) fn finalize(&self, draft_id: Ulid, checkpoint_id: Ulid) -> Result<()> {
        remove_dir_if_exists(&self.layout.published_prev())?;
        remove_file_if_exists(&self.layout.draft_file())?;
        RevisionStore::new(self.layout.clone(), self.config.clone()).prune_all()?;

        // Agent scratch files never persist past publish.
        delete_scratch_files(&self.layout.published());
        FileManifest::scan(&self.layout.published())?.store(&self.layout.manifest_file())?;

        workbench::bump_generation(&self.layout)?;
        audit::append(
            &self.layout,
            audit::AuditEvent::new(audit::AuditEventKind::Published)
                .draft(draft_id)
                .checkpoint(checkpoint_id),
        );
        ledger::commit(&self.layout)?;
        Ok(())
    }

    /// Validate there is room for one more copy of the larger tree before
    /// any step runs.
    fn ensure_free_space(&self) -> Result<()> {
        let draft_bytes = dir_stats(&self.layout.draft()).total_bytes;
        let published_bytes = dir_stats(&self.layout.published()).total_bytes;
        let needed = draft_bytes
            .max(published_bytes)
            .saturating_add(self.config.free_space_headroom_bytes);
        let available = available_space(self.layout.root())?;
        if available < needed {
            return Err(EngineError::DiskExhausted { needed, available });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, WorkbenchLayout, PublishCoordinator, DraftManager) {
        let temp = TempDir::new().unwrap();
        let layout = WorkbenchLayout::new(temp.path());
        fs::create_dir_all(layout.published()).unwrap();
        fs::write(layout.published().join("a.txt"), "v1").unwrap();
        crate::workbench::write_initial_record(&layout, "test bench").unwrap();
        let coordinator = PublishCoordinator::new(layout.clone(), EngineConfig::default());
        let drafts = DraftManager::new(layout.clone());
        (temp, layout, coordinator, drafts)
    }

    #[test]
    fn test_publish_promotes_draft() {
        let (_temp, layout, coordinator, drafts) = setup();
        drafts.create("test").unwrap();
        fs::write(layout.draft().join("a.txt"), "v2").unwrap();

        let outcome = coordinator.publish(&NullProgress).unwrap();

        assert_eq!(
            fs::read_to_string(layout.published().join("a.txt")).unwrap(),
            "v2"
        );
        assert!(!layout.draft().exists());
        assert!(!layout.draft_file().exists());
        assert!(!layout.published_prev().exists());
        assert!(!layout.transaction_file().exists());

        // Exactly one publish-reason checkpoint, holding the pre-publish tree
        let checkpoints =
            CheckpointStore::new(layout.clone(), EngineConfig::default());
        let publishes: Vec<_> = checkpoints
            .list()
            .unwrap()
            .into_iter()
            .filter(|c| c.reason == CheckpointReason::Publish)
            .collect();
        assert_eq!(publishes.len(), 1);
        assert_eq!(publishes[0].checkpoint_id, outcome.checkpoint_id);
        let snapshot = layout.published_snapshot(&outcome.checkpoint_id.to_string());
        assert_eq!(
            fs::read_to_string(snapshot.join("a.txt")).unwrap(),
            "v1"
        );
    }

    #[test]
    fn test_publish_without_draft_fails() {
        let (_temp, _layout, coordinator, _drafts) = setup();
        assert!(matches!(
            coordinator.publish(&NullProgress),
            Err(EngineError::NoDraft)
        ));
    }

    #[test]
    fn test_publish_conflict_leaves_both_trees_untouched() {
        let (_temp, layout, coordinator, drafts) = setup();
        drafts.create("test").unwrap();
        fs::write(layout.draft().join("a.txt"), "v2").unwrap();

        // External edit to published after draft creation
        fs::write(layout.published().join("a.txt"), "external").unwrap();

        let result = coordinator.publish(&NullProgress);
        assert!(matches!(result, Err(EngineError::PublishConflict)));

        assert_eq!(
            fs::read_to_string(layout.published().join("a.txt")).unwrap(),
            "external"
        );
        assert_eq!(
            fs::read_to_string(layout.draft().join("a.txt")).unwrap(),
            "v2"
        );
        // No checkpoint was taken, no marker left behind
        let checkpoints =
            CheckpointStore::new(layout.clone(), EngineConfig::default());
        assert!(checkpoints.list().unwrap().is_empty());
        assert!(!layout.transaction_file().exists());
    }

    #[test]
    fn test_publish_prunes_revisions_and_scratch() {
        let (_temp, layout, coordinator, drafts) = setup();
        drafts.create("test").unwrap();
        fs::write(layout.draft().join("a.txt"), "v2").unwrap();
        fs::write(layout.draft().join("_scratch.txt"), "notes").unwrap();

        let revisions = RevisionStore::new(layout.clone(), EngineConfig::default());
        revisions.snapshot("msg-1").unwrap();

        coordinator.publish(&NullProgress).unwrap();

        assert!(!layout.published().join("_scratch.txt").exists());
        assert!(revisions.list().unwrap().is_empty());
    }

    #[test]
    fn test_publish_rebuilds_manifest() {
        let (_temp, layout, coordinator, drafts) = setup();
        drafts.create("test").unwrap();
        fs::write(layout.draft().join("b.txt"), "new file").unwrap();

        coordinator.publish(&NullProgress).unwrap();

        let manifest = FileManifest::load(&layout.manifest_file()).unwrap();
        let paths: Vec<_> = manifest.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_publish_bumps_generation() {
        let (_temp, layout, coordinator, drafts) = setup();
        let before = crate::workbench::read_record(&layout).unwrap().generation;

        drafts.create("test").unwrap();
        coordinator.publish(&NullProgress).unwrap();

        let after = crate::workbench::read_record(&layout).unwrap().generation;
        assert!(after > before);
    }

    #[test]
    fn test_progress_phases_in_order() {
        let (_temp, layout, coordinator, drafts) = setup();
        drafts.create("test").unwrap();
        fs::write(layout.draft().join("a.txt"), "v2").unwrap();

        let phases = std::cell::RefCell::new(Vec::new());
        let sink = |phase: Phase| phases.borrow_mut().push(phase);
        coordinator.publish(&sink).unwrap();

        assert_eq!(
            *phases.borrow(),
            vec![
                Phase::Validating,
                Phase::ConflictCheck,
                Phase::CheckpointPrePublish,
                Phase::SwapDirectories,
                Phase::Finalizing,
            ]
        );
    }
}
