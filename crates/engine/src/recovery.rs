//! Crash recovery and startup reconciliation
//!
//! Runs for every workbench before any command is accepted. The
//! transaction marker decides everything: no marker means only stray
//! staging/aside paths can exist and they are swept; a marker means the
//! last session died mid-publish or mid-restore, and the tree is driven
//! to whichever stable state it is closest to. Re-running reconciliation
//! produces the same directory state.

use crate::checkpoint::CheckpointStore;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::layout::WorkbenchLayout;
use crate::ledger::{self, TransactionKind, TransactionMarker};
use crate::publish::PublishCoordinator;
use std::fs;
use ulid::Ulid;
use workbench_core::{read_json_opt, remove_dir_if_exists, remove_file_if_exists};

/// Reconcile one workbench. Idempotent.
pub fn recover_workbench(layout: &WorkbenchLayout, config: &EngineConfig) -> Result<()> {
    if let Some(marker) = ledger::read_pending(layout)? {
        match marker.kind {
            TransactionKind::Publish => recover_publish(layout, config, &marker)?,
            TransactionKind::Restore => recover_restore(layout, config, &marker)?,
        }
    }
    sweep_strays(layout)?;
    reconcile_draft(layout)?;
    ensure_published_exists(layout)?;
    Ok(())
}

/// A publish marker with the draft still on disk means the swap never
/// completed: put published back if it was renamed aside and keep the
/// draft untouched. Without the draft directory the swap landed, so the
/// remaining finalize work is replayed.
fn recover_publish(
    layout: &WorkbenchLayout,
    config: &EngineConfig,
    marker: &TransactionMarker,
) -> Result<()> {
    let published = layout.published();
    let prev = layout.published_prev();

    if layout.draft().is_dir() {
        if !published.exists() && prev.is_dir() {
            fs::rename(&prev, &published)?;
        }
        ledger::commit(layout)?;
        tracing::warn!(
            "Rolled back interrupted publish for {} (draft preserved)",
            layout.root().display()
        );
        return Ok(());
    }

    let draft_id = marker.draft_id.unwrap_or_else(Ulid::nil);
    let checkpoint_id = marker.checkpoint_id.unwrap_or_else(Ulid::nil);
    PublishCoordinator::new(layout.clone(), config.clone()).finalize(draft_id, checkpoint_id)?;
    tracing::warn!(
        "Completed interrupted publish for {}",
        layout.root().display()
    );
    Ok(())
}

/// A restore marker with the staging tree still on disk means the swap
/// never consumed it: put published back if needed and drop the staging.
/// A consumed staging means the swap landed; finalize is replayed.
fn recover_restore(
    layout: &WorkbenchLayout,
    config: &EngineConfig,
    marker: &TransactionMarker,
) -> Result<()> {
    let published = layout.published();
    let prev = layout.published_prev();
    let staging = layout.published_restore_staging();

    if staging.is_dir() {
        if !published.exists() && prev.is_dir() {
            fs::rename(&prev, &published)?;
        }
        remove_dir_if_exists(&staging)?;
        ledger::commit(layout)?;
        tracing::warn!(
            "Rolled back interrupted restore for {}",
            layout.root().display()
        );
        return Ok(());
    }

    let checkpoint_id = marker.checkpoint_id.unwrap_or_else(Ulid::nil);
    CheckpointStore::new(layout.clone(), config.clone()).finalize_restore(checkpoint_id)?;
    tracing::warn!(
        "Completed interrupted restore for {}",
        layout.root().display()
    );
    Ok(())
}

/// Remove leftovers that only exist mid-operation: aside trees, restore
/// staging, and unfinished checkpoint/revision builds.
fn sweep_strays(layout: &WorkbenchLayout) -> Result<()> {
    for path in [
        layout.published_prev(),
        layout.published_restore_staging(),
        layout.draft_restore_staging(),
    ] {
        if path.exists() {
            tracing::warn!("Removing stray path: {}", path.display());
            remove_dir_if_exists(&path)?;
        }
    }

    for dir in [layout.checkpoints_dir(), layout.revisions_dir()] {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().ends_with(".staging") {
                tracing::warn!("Removing unfinished build: {}", entry.path().display());
                remove_dir_if_exists(&entry.path())?;
            }
        }
    }

    // A checkpoint snapshot without metadata is an unfinished create;
    // metadata without a snapshot cannot be restored. Drop both halves.
    let checkpoints = layout.checkpoints_dir();
    if let Ok(entries) = fs::read_dir(&checkpoints) {
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if path.is_dir() && !name.ends_with(".staging") {
                if !layout.checkpoint_meta_file(&name).is_file() {
                    tracing::warn!("Removing checkpoint snapshot without metadata: {}", name);
                    remove_dir_if_exists(&path)?;
                }
            } else if let Some(id) = name.strip_suffix(".json") {
                if !layout.checkpoint_dir(id).is_dir() {
                    tracing::warn!("Removing checkpoint metadata without snapshot: {}", id);
                    remove_file_if_exists(&path)?;
                }
            }
        }
    }
    Ok(())
}

/// The draft directory and its record must agree; a lone half is the
/// residue of an interrupted create or restore and is dropped.
fn reconcile_draft(layout: &WorkbenchLayout) -> Result<()> {
    let dir_exists = layout.draft().is_dir();
    let record_exists =
        read_json_opt::<crate::draft::DraftState>(&layout.draft_file())?.is_some();

    if dir_exists && !record_exists {
        tracing::warn!(
            "Removing draft directory without record: {}",
            layout.root().display()
        );
        remove_dir_if_exists(&layout.draft())?;
    } else if record_exists && !dir_exists {
        tracing::warn!(
            "Removing draft record without directory: {}",
            layout.root().display()
        );
        remove_file_if_exists(&layout.draft_file())?;
    }
    Ok(())
}

/// Published must always exist for a workbench that has a record.
fn ensure_published_exists(layout: &WorkbenchLayout) -> Result<()> {
    if layout.workbench_file().is_file() && !layout.published().is_dir() {
        tracing::warn!(
            "Recreating missing published directory: {}",
            layout.root().display()
        );
        fs::create_dir_all(layout.published())?;
    }
    Ok(())
}
