//! Workbench records and the command surface
//!
//! `WorkbenchManager` owns the base directory, the configuration and the
//! lock table, and exposes the narrow command set collaborators call.
//! Every mutating command resolves the workbench, takes its lock for the
//! full duration, and delegates to the draft / checkpoint / revision /
//! publish components. Read-only listings take no lock. Startup runs
//! recovery across all workbenches before the manager hands out any
//! command; a workbench whose recovery failed refuses mutating commands
//! until an operator intervenes.

use crate::checkpoint::{CheckpointMeta, CheckpointReason, CheckpointStore};
use crate::config::EngineConfig;
use crate::draft::{DraftManager, DraftState};
use crate::error::{EngineError, Result};
use crate::layout::WorkbenchLayout;
use crate::lock::{LockTable, WorkbenchGuard};
use crate::manifest::FileManifest;
use crate::progress::{NullProgress, ProgressSink};
use crate::publish::{PublishCoordinator, PublishOutcome};
use crate::recovery::recover_workbench;
use crate::revision::{RevisionRecord, RevisionStore};
use crate::{audit, now_ms};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use ulid::Ulid;
use workbench_core::{read_json_opt, write_json_atomic};

/// Record stored at `meta/workbench.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workbench {
    pub id: Ulid,
    pub name: String,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    /// Bumped by every publish and restore; never reset, never restored
    /// from checkpoints.
    pub generation: u64,
}

pub struct WorkbenchManager {
    base_dir: PathBuf,
    config: EngineConfig,
    locks: LockTable,
    /// Workbenches whose startup recovery failed; mutating commands are
    /// refused with `CrashRecoveryRequired` until an operator intervenes.
    halted: DashMap<Ulid, String>,
}

impl WorkbenchManager {
    /// Open the manager over a base directory, creating it if needed and
    /// reconciling every workbench before any command is accepted.
    pub fn open(base_dir: impl Into<PathBuf>, config: EngineConfig) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        let manager = Self {
            base_dir,
            config,
            locks: LockTable::new(),
            halted: DashMap::new(),
        };
        manager.recover_all();
        Ok(manager)
    }

    fn recover_all(&self) {
        let Ok(entries) = fs::read_dir(&self.base_dir) else {
            return;
        };
        for entry in entries.flatten() {
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let layout = WorkbenchLayout::new(entry.path());
            if !layout.workbench_file().is_file() {
                continue;
            }
            if let Err(e) = recover_workbench(&layout, &self.config) {
                let reason = e.to_string();
                tracing::error!(
                    "Recovery failed for {}; refusing mutations: {}",
                    entry.path().display(),
                    reason
                );
                if let Ok(Some(record)) =
                    read_json_opt::<Workbench>(&layout.workbench_file())
                {
                    self.halted.insert(record.id, reason);
                }
            }
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a new workbench with an empty published tree.
    pub fn create(&self, name: &str) -> Result<Workbench> {
        let name = if name.trim().is_empty() {
            "Untitled Workbench"
        } else {
            name.trim()
        };
        let id = Ulid::new();
        let layout = WorkbenchLayout::new(self.base_dir.join(id.to_string()));
        fs::create_dir_all(layout.published())?;
        fs::create_dir_all(layout.meta())?;

        let record = write_initial_record_named(&layout, id, name)?;
        FileManifest::default().store(&layout.manifest_file())?;
        audit::append(
            &layout,
            audit::AuditEvent::new(audit::AuditEventKind::WorkbenchCreated).detail(name),
        );
        tracing::info!("workbench.create id={} name={:?}", id, name);
        Ok(record)
    }

    pub fn get(&self, id: Ulid) -> Result<Workbench> {
        read_record(&self.layout_of(id)?)
    }

    /// All workbenches, most recently updated first. Lock-free; entries
    /// that fail to parse are skipped.
    pub fn list(&self) -> Result<Vec<Workbench>> {
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut results = Vec::new();
        for entry in entries.flatten() {
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let layout = WorkbenchLayout::new(entry.path());
            if let Ok(Some(record)) = read_json_opt::<Workbench>(&layout.workbench_file()) {
                results.push(record);
            }
        }
        results.sort_by(|a, b| (b.updated_at_ms, b.id).cmp(&(a.updated_at_ms, a.id)));
        Ok(results)
    }

    /// Delete a workbench outright. Refused while a draft is active.
    pub fn delete(&self, id: Ulid) -> Result<()> {
        let layout = self.layout_of(id)?;
        let _guard = self.guard(id)?;
        if read_json_opt::<DraftState>(&layout.draft_file())?.is_some()
            || layout.draft().is_dir()
        {
            return Err(EngineError::DraftExists);
        }
        fs::remove_dir_all(layout.root())?;
        tracing::info!("workbench.delete id={}", id);
        Ok(())
    }

    /// The tree collaborators should read and write right now: draft when
    /// one is active, published otherwise.
    pub fn active_view(&self, id: Ulid) -> Result<PathBuf> {
        Ok(self.layout_of(id)?.active_view())
    }

    // ---- draft commands ----

    pub fn draft_state(&self, id: Ulid) -> Result<Option<DraftState>> {
        DraftManager::new(self.layout_of(id)?).state()
    }

    pub fn create_draft(&self, id: Ulid, source: &str) -> Result<DraftState> {
        let layout = self.layout_of(id)?;
        let _guard = self.guard(id)?;
        let state = DraftManager::new(layout.clone()).create(source)?;
        audit::append(
            &layout,
            audit::AuditEvent::new(audit::AuditEventKind::DraftCreated)
                .draft(state.draft_id)
                .detail(source),
        );
        touch_updated(&layout)?;
        Ok(state)
    }

    pub fn discard_draft(&self, id: Ulid) -> Result<()> {
        let layout = self.layout_of(id)?;
        let _guard = self.guard(id)?;
        let state = DraftManager::new(layout.clone()).discard()?;
        RevisionStore::new(layout.clone(), self.config.clone()).prune_all()?;
        audit::append(
            &layout,
            audit::AuditEvent::new(audit::AuditEventKind::DraftDiscarded).draft(state.draft_id),
        );
        touch_updated(&layout)?;
        Ok(())
    }

    // ---- publish ----

    pub fn publish(&self, id: Ulid) -> Result<PublishOutcome> {
        self.publish_with_progress(id, &NullProgress)
    }

    pub fn publish_with_progress(
        &self,
        id: Ulid,
        progress: &dyn ProgressSink,
    ) -> Result<PublishOutcome> {
        let layout = self.layout_of(id)?;
        let _guard = self.guard(id)?;
        let outcome =
            PublishCoordinator::new(layout.clone(), self.config.clone()).publish(progress)?;
        touch_updated(&layout)?;
        Ok(outcome)
    }

    // ---- checkpoints ----

    pub fn create_checkpoint(
        &self,
        id: Ulid,
        reason: CheckpointReason,
        description: Option<String>,
    ) -> Result<CheckpointMeta> {
        let layout = self.layout_of(id)?;
        let _guard = self.guard(id)?;
        CheckpointStore::new(layout, self.config.clone()).create(reason, description)
    }

    pub fn list_checkpoints(&self, id: Ulid) -> Result<Vec<CheckpointMeta>> {
        CheckpointStore::new(self.layout_of(id)?, self.config.clone()).list()
    }

    pub fn get_checkpoint(&self, id: Ulid, checkpoint_id: Ulid) -> Result<CheckpointMeta> {
        CheckpointStore::new(self.layout_of(id)?, self.config.clone()).get(checkpoint_id)
    }

    pub fn restore_checkpoint(&self, id: Ulid, checkpoint_id: Ulid) -> Result<()> {
        self.restore_checkpoint_with_progress(id, checkpoint_id, &NullProgress)
    }

    pub fn restore_checkpoint_with_progress(
        &self,
        id: Ulid,
        checkpoint_id: Ulid,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        let layout = self.layout_of(id)?;
        let _guard = self.guard(id)?;
        CheckpointStore::new(layout.clone(), self.config.clone())
            .restore(checkpoint_id, progress)?;
        touch_updated(&layout)?;
        Ok(())
    }

    // ---- draft revisions ----

    pub fn snapshot_revision(&self, id: Ulid, head_pointer: &str) -> Result<RevisionRecord> {
        let layout = self.layout_of(id)?;
        let _guard = self.guard(id)?;
        RevisionStore::new(layout, self.config.clone()).snapshot(head_pointer)
    }

    pub fn restore_revision(&self, id: Ulid, head_pointer: &str) -> Result<RevisionRecord> {
        let layout = self.layout_of(id)?;
        let _guard = self.guard(id)?;
        let record =
            RevisionStore::new(layout.clone(), self.config.clone()).restore_to(head_pointer)?;
        audit::append(
            &layout,
            audit::AuditEvent::new(audit::AuditEventKind::RevisionRestored)
                .revision(record.revision_id.clone())
                .detail(head_pointer),
        );
        touch_updated(&layout)?;
        Ok(record)
    }

    // ---- plumbing ----

    fn layout_of(&self, id: Ulid) -> Result<WorkbenchLayout> {
        let layout = WorkbenchLayout::new(self.base_dir.join(id.to_string()));
        if !layout.workbench_file().is_file() {
            return Err(EngineError::WorkbenchNotFound(id.to_string()));
        }
        Ok(layout)
    }

    /// Refuse halted workbenches, then take the per-workbench lock.
    fn guard(&self, id: Ulid) -> Result<WorkbenchGuard> {
        if let Some(entry) = self.halted.get(&id) {
            return Err(EngineError::CrashRecoveryRequired(entry.value().clone()));
        }
        self.locks.acquire(id, self.config.lock_timeout)
    }
}

pub(crate) fn read_record(layout: &WorkbenchLayout) -> Result<Workbench> {
    read_json_opt(&layout.workbench_file())?.ok_or_else(|| {
        EngineError::WorkbenchNotFound(layout.root().display().to_string())
    })
}

fn write_initial_record_named(
    layout: &WorkbenchLayout,
    id: Ulid,
    name: &str,
) -> Result<Workbench> {
    let now = now_ms();
    let record = Workbench {
        id,
        name: name.to_string(),
        created_at_ms: now,
        updated_at_ms: now,
        generation: 0,
    };
    write_json_atomic(&layout.workbench_file(), &record)?;
    Ok(record)
}

/// Seed a workbench record for a pre-built layout. Used by tests and by
/// tools that adopt an existing tree.
pub fn write_initial_record(layout: &WorkbenchLayout, name: &str) -> Result<Workbench> {
    write_initial_record_named(layout, Ulid::new(), name)
}

/// Advance the generation counter and refresh `updated_at`.
pub(crate) fn bump_generation(layout: &WorkbenchLayout) -> Result<u64> {
    let mut record = read_record(layout)?;
    record.generation += 1;
    record.updated_at_ms = now_ms();
    write_json_atomic(&layout.workbench_file(), &record)?;
    Ok(record.generation)
}

pub(crate) fn touch_updated(layout: &WorkbenchLayout) -> Result<()> {
    let mut record = read_record(layout)?;
    record.updated_at_ms = now_ms();
    write_json_atomic(&layout.workbench_file(), &record)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (TempDir, WorkbenchManager) {
        let temp = TempDir::new().unwrap();
        let manager = WorkbenchManager::open(temp.path(), EngineConfig::default()).unwrap();
        (temp, manager)
    }

    #[test]
    fn test_create_and_get() {
        let (_temp, manager) = manager();
        let wb = manager.create("Quarterly report").unwrap();

        let fetched = manager.get(wb.id).unwrap();
        assert_eq!(fetched.name, "Quarterly report");
        assert_eq!(fetched.generation, 0);
    }

    #[test]
    fn test_create_defaults_empty_name() {
        let (_temp, manager) = manager();
        let wb = manager.create("   ").unwrap();
        assert_eq!(wb.name, "Untitled Workbench");
    }

    #[test]
    fn test_list_newest_updated_first() {
        let (_temp, manager) = manager();
        let a = manager.create("a").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = manager.create("b").unwrap();

        let listed = manager.list().unwrap();
        assert_eq!(listed[0].id, b.id);
        assert_eq!(listed[1].id, a.id);

        // Touching a moves it to the front
        std::thread::sleep(std::time::Duration::from_millis(5));
        manager.create_draft(a.id, "test").unwrap();
        let listed = manager.list().unwrap();
        assert_eq!(listed[0].id, a.id);
    }

    #[test]
    fn test_get_unknown_fails() {
        let (_temp, manager) = manager();
        assert!(matches!(
            manager.get(Ulid::new()),
            Err(EngineError::WorkbenchNotFound(_))
        ));
    }

    #[test]
    fn test_delete_refused_while_draft_exists() {
        let (_temp, manager) = manager();
        let wb = manager.create("bench").unwrap();
        manager.create_draft(wb.id, "test").unwrap();

        assert!(matches!(
            manager.delete(wb.id),
            Err(EngineError::DraftExists)
        ));

        manager.discard_draft(wb.id).unwrap();
        manager.delete(wb.id).unwrap();
        assert!(manager.get(wb.id).is_err());
    }

    #[test]
    fn test_active_view_follows_draft() {
        let (_temp, manager) = manager();
        let wb = manager.create("bench").unwrap();

        let view = manager.active_view(wb.id).unwrap();
        assert!(view.ends_with("published"));

        manager.create_draft(wb.id, "test").unwrap();
        let view = manager.active_view(wb.id).unwrap();
        assert!(view.ends_with("draft"));
    }
}
