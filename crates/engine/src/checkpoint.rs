//! Checkpoint store
//!
//! Checkpoints are immutable, named snapshots of the published tree plus
//! the file manifest, stored under `meta/checkpoints/`. They are built in
//! a staging directory and committed with a single rename; metadata is
//! written last, so a checkpoint without its `.json` is an unfinished
//! build and is swept by recovery. Restore swaps a checkpoint back into
//! place with the same aside-then-rename technique publish uses.

use crate::config::{DiskPressurePolicy, EngineConfig};
use crate::error::{EngineError, Result};
use crate::layout::WorkbenchLayout;
use crate::ledger::{self, TransactionMarker};
use crate::manifest::FileManifest;
use crate::progress::{Phase, ProgressSink};
use crate::{audit, now_ms, workbench};
use serde::{Deserialize, Serialize};
use std::fs;
use ulid::Ulid;
use workbench_core::{
    available_space, dir_stats, materialize_into, read_json_opt, remove_dir_if_exists,
    remove_file_if_exists, write_json_atomic, SnapshotMode,
};

/// Why a checkpoint was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointReason {
    /// Periodic or event-driven safety net
    Auto,
    /// Explicit user request
    Manual,
    /// Taken immediately before a publish swap; the undo path for publish
    Publish,
    /// Taken immediately before a restore swap; makes restore undoable
    PreRestore,
}

impl std::fmt::Display for CheckpointReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CheckpointReason::Auto => "auto",
            CheckpointReason::Manual => "manual",
            CheckpointReason::Publish => "publish",
            CheckpointReason::PreRestore => "pre_restore",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointStats {
    pub files: u64,
    pub total_bytes: u64,
}

/// Metadata stored at `meta/checkpoints/<id>.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub checkpoint_id: Ulid,
    pub created_at_ms: u64,
    pub reason: CheckpointReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub stats: CheckpointStats,
}

pub struct CheckpointStore {
    layout: WorkbenchLayout,
    config: EngineConfig,
}

impl CheckpointStore {
    pub fn new(layout: WorkbenchLayout, config: EngineConfig) -> Self {
        Self { layout, config }
    }

    /// Snapshot published plus the manifest into a new checkpoint.
    ///
    /// Nothing outside `meta/checkpoints/` is touched, so a failure here
    /// never endangers published state; the operation that needed the
    /// checkpoint simply aborts.
    pub fn create(
        &self,
        reason: CheckpointReason,
        description: Option<String>,
    ) -> Result<CheckpointMeta> {
        let id = Ulid::new();
        let id_str = id.to_string();
        let staging = self.layout.checkpoint_staging(&id_str);
        remove_dir_if_exists(&staging)?;

        if let Err(e) = self.build_snapshot(&staging) {
            let _ = remove_dir_if_exists(&staging);
            return Err(e);
        }

        let final_dir = self.layout.checkpoint_dir(&id_str);
        if let Err(e) = fs::rename(&staging, &final_dir) {
            let _ = remove_dir_if_exists(&staging);
            return Err(e.into());
        }

        let meta = CheckpointMeta {
            checkpoint_id: id,
            created_at_ms: now_ms(),
            reason,
            description,
            stats: {
                let ds = dir_stats(&final_dir.join("published_snapshot"));
                CheckpointStats {
                    files: ds.files,
                    total_bytes: ds.total_bytes,
                }
            },
        };
        if let Err(e) = write_json_atomic(&self.layout.checkpoint_meta_file(&id_str), &meta) {
            let _ = remove_dir_if_exists(&final_dir);
            return Err(e.into());
        }

        tracing::info!(
            "checkpoint.create workbench={} checkpoint={} reason={:?}",
            self.layout.root().display(),
            id,
            reason
        );
        audit::append(
            &self.layout,
            audit::AuditEvent::new(audit::AuditEventKind::CheckpointCreated)
                .checkpoint(id)
                .detail(reason.to_string()),
        );

        self.apply_retention()?;
        Ok(meta)
    }

    fn build_snapshot(&self, staging: &std::path::Path) -> Result<()> {
        let published_snapshot = staging.join("published_snapshot");
        let meta_snapshot = staging.join("meta_snapshot");
        fs::create_dir_all(&published_snapshot)?;
        fs::create_dir_all(&meta_snapshot)?;

        if self.layout.published().is_dir() {
            // Automated writers never edit published in place (they write
            // to the draft), so linking against it is safe here.
            materialize_into(
                &self.layout.published(),
                &published_snapshot,
                SnapshotMode::Link,
            )?;
        }
        let manifest_src = self.layout.manifest_file();
        if manifest_src.is_file() {
            fs::copy(&manifest_src, meta_snapshot.join("files.json"))?;
        }
        Ok(())
    }

    /// All checkpoint metadata, newest first. Lock-free: entries that are
    /// mid-write or mid-delete are skipped rather than failing the listing.
    pub fn list(&self) -> Result<Vec<CheckpointMeta>> {
        let dir = self.layout.checkpoints_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut results = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Ok(Some(meta)) = read_json_opt::<CheckpointMeta>(&path) {
                    results.push(meta);
                }
            }
        }
        results.sort_by(|a, b| {
            (b.created_at_ms, b.checkpoint_id).cmp(&(a.created_at_ms, a.checkpoint_id))
        });
        Ok(results)
    }

    pub fn get(&self, id: Ulid) -> Result<CheckpointMeta> {
        read_json_opt(&self.layout.checkpoint_meta_file(&id.to_string()))?
            .ok_or_else(|| EngineError::CheckpointNotFound(id.to_string()))
    }

    fn delete(&self, id: Ulid) -> Result<()> {
        let id_str = id.to_string();
        // Metadata first: a snapshot without metadata is invisible to
        // list() and swept later; metadata without a snapshot would look
        // like a restorable checkpoint that cannot be restored.
        remove_file_if_exists(&self.layout.checkpoint_meta_file(&id_str))?;
        remove_dir_if_exists(&self.layout.checkpoint_dir(&id_str))?;
        Ok(())
    }

    /// Swap a checkpoint's snapshot back into place as published.
    ///
    /// Blocked while a draft exists. The current published tree is
    /// checkpointed (`pre_restore`) first, so restore is itself undoable.
    pub fn restore(&self, id: Ulid, progress: &dyn ProgressSink) -> Result<()> {
        progress.phase(Phase::Validating);
        if read_json_opt::<crate::draft::DraftState>(&self.layout.draft_file())?.is_some()
            || self.layout.draft().is_dir()
        {
            return Err(EngineError::DraftExists);
        }
        let meta = self.get(id)?;
        let snapshot = self.layout.published_snapshot(&id.to_string());
        if !snapshot.is_dir() {
            return Err(EngineError::CheckpointNotFound(format!(
                "{id} (snapshot directory missing)"
            )));
        }
        self.ensure_free_space(&meta)?;

        // Undo path for the restore itself. If this fails (disk full),
        // nothing irreversible has happened yet and the restore aborts.
        let pre_restore = self.create(
            CheckpointReason::PreRestore,
            Some(format!("Before restore of {id}")),
        )?;

        ledger::begin(&self.layout, &TransactionMarker::restore(id))?;

        let staging = self.layout.published_restore_staging();
        if let Err(e) = remove_dir_if_exists(&staging)
            .map_err(EngineError::from)
            .and_then(|()| {
                fs::create_dir_all(&staging)?;
                // Byte copy: the staging tree becomes published, which
                // external collaborators may edit in place; it must not
                // share inodes with the immutable checkpoint.
                materialize_into(&snapshot, &staging, SnapshotMode::Copy)?;
                Ok(())
            })
        {
            // Nothing swapped yet: roll the transaction back cleanly.
            progress.phase(Phase::RollingBack);
            let _ = remove_dir_if_exists(&staging);
            let _ = ledger::commit(&self.layout);
            return Err(e);
        }

        progress.phase(Phase::SwapDirectories);
        let published = self.layout.published();
        let prev = self.layout.published_prev();
        if let Err(e) = remove_dir_if_exists(&prev) {
            progress.phase(Phase::RollingBack);
            let _ = remove_dir_if_exists(&staging);
            let _ = ledger::commit(&self.layout);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&published, &prev) {
            progress.phase(Phase::RollingBack);
            let _ = remove_dir_if_exists(&staging);
            let _ = ledger::commit(&self.layout);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&staging, &published) {
            // First rename is reversible until the second lands.
            progress.phase(Phase::RollingBack);
            let _ = fs::rename(&prev, &published);
            let _ = remove_dir_if_exists(&staging);
            let _ = ledger::commit(&self.layout);
            return Err(e.into());
        }

        // Past the point of no return: failures below are self-healed,
        // here or by startup recovery, never surfaced as a failed restore.
        progress.phase(Phase::Finalizing);
        if let Err(e) = self.finalize_restore(id) {
            tracing::error!(
                "restore finalize deferred to startup recovery for {}: {}",
                self.layout.root().display(),
                e
            );
        } else {
            tracing::info!(
                "checkpoint.restore workbench={} checkpoint={} pre_restore={}",
                self.layout.root().display(),
                id,
                pre_restore.checkpoint_id
            );
        }
        Ok(())
    }

    /// Finish a restore whose swap has landed: bring back the manifest,
    /// drop the aside tree, advance the generation, commit the marker.
    /// Safe to re-run.
    pub(crate) fn finalize_restore(&self, checkpoint_id: Ulid) -> Result<()> {
        let meta_snapshot = self.layout.meta_snapshot(&checkpoint_id.to_string());
        let manifest = match read_json_opt::<FileManifest>(&meta_snapshot.join("files.json"))? {
            Some(m) => m,
            None => FileManifest::scan(&self.layout.published())?,
        };
        manifest.store(&self.layout.manifest_file())?;

        remove_dir_if_exists(&self.layout.published_prev())?;
        remove_dir_if_exists(&self.layout.published_restore_staging())?;
        workbench::bump_generation(&self.layout)?;
        audit::append(
            &self.layout,
            audit::AuditEvent::new(audit::AuditEventKind::CheckpointRestored)
                .checkpoint(checkpoint_id),
        );
        ledger::commit(&self.layout)?;
        Ok(())
    }

    fn ensure_free_space(&self, meta: &CheckpointMeta) -> Result<()> {
        let published_bytes = dir_stats(&self.layout.published()).total_bytes;
        let needed = meta
            .stats
            .total_bytes
            .max(published_bytes)
            .saturating_add(self.config.free_space_headroom_bytes);
        let available = available_space(self.layout.root())?;
        if available < needed {
            return Err(EngineError::DiskExhausted { needed, available });
        }
        Ok(())
    }

    /// Retention, run after every create.
    ///
    /// The newest `publish` and newest `pre_restore` checkpoints are
    /// always kept. `auto` and `manual` buckets are capped independently,
    /// oldest pruned first. If a storage budget is configured and still
    /// exceeded, remaining `auto` entries prune oldest-first, then
    /// `manual`, then unprotected older `publish`/`pre_restore` entries;
    /// what happens when the budget still cannot be met is governed by
    /// the disk pressure policy.
    fn apply_retention(&self) -> Result<()> {
        let all = self.list()?; // newest first

        let newest_publish = all
            .iter()
            .find(|c| c.reason == CheckpointReason::Publish)
            .map(|c| c.checkpoint_id);
        let newest_pre_restore = all
            .iter()
            .find(|c| c.reason == CheckpointReason::PreRestore)
            .map(|c| c.checkpoint_id);
        let protected =
            |id: Ulid| Some(id) == newest_publish || Some(id) == newest_pre_restore;

        let mut removed = std::collections::HashSet::new();
        for (reason, keep) in [
            (CheckpointReason::Auto, self.config.max_auto_checkpoints),
            (CheckpointReason::Manual, self.config.max_manual_checkpoints),
        ] {
            let bucket: Vec<_> = all.iter().filter(|c| c.reason == reason).collect();
            for meta in bucket.iter().skip(keep) {
                if protected(meta.checkpoint_id) {
                    continue;
                }
                self.delete(meta.checkpoint_id)?;
                removed.insert(meta.checkpoint_id);
            }
        }

        let Some(budget) = self.config.checkpoint_storage_budget_bytes else {
            return Ok(());
        };
        let mut remaining: Vec<_> = all
            .iter()
            .filter(|c| !removed.contains(&c.checkpoint_id))
            .collect();
        let mut total: u64 = remaining.iter().map(|c| c.stats.total_bytes).sum();
        if total <= budget {
            return Ok(());
        }

        // Oldest-first within each reason tier.
        remaining.reverse();
        for tier in [
            CheckpointReason::Auto,
            CheckpointReason::Manual,
            CheckpointReason::Publish,
            CheckpointReason::PreRestore,
        ] {
            for meta in remaining.iter().filter(|c| c.reason == tier) {
                if total <= budget {
                    return Ok(());
                }
                if protected(meta.checkpoint_id) {
                    continue;
                }
                self.delete(meta.checkpoint_id)?;
                total = total.saturating_sub(meta.stats.total_bytes);
            }
        }

        if total > budget {
            match self.config.disk_pressure_policy {
                DiskPressurePolicy::BestEffort => {}
                DiskPressurePolicy::Warn => tracing::warn!(
                    "checkpoint storage over budget for {}: {} > {} bytes after pruning",
                    self.layout.root().display(),
                    total,
                    budget
                ),
                DiskPressurePolicy::Fail => {
                    return Err(EngineError::DiskExhausted {
                        needed: total,
                        available: budget,
                    })
                }
            }
        }
        Ok(())
    }
}
