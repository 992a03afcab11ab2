//! Checkpoint commands

use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;
use workbench_engine::{CheckpointReason, Phase};

fn parse_reason(reason: &str) -> Result<CheckpointReason> {
    match reason {
        "auto" => Ok(CheckpointReason::Auto),
        "manual" => Ok(CheckpointReason::Manual),
        other => anyhow::bail!(
            "Invalid reason '{}': only 'auto' and 'manual' can be requested \
             (publish/pre_restore checkpoints are created by the engine)",
            other
        ),
    }
}

pub fn create(
    base_dir: &Path,
    workbench: &str,
    reason: &str,
    description: Option<String>,
) -> Result<()> {
    let manager = util::open_manager(base_dir)?;
    let id = util::resolve_workbench(&manager, workbench)?;
    let reason = parse_reason(reason)?;

    let meta = manager.create_checkpoint(id, reason, description)?;
    println!(
        "{} checkpoint {} ({} files, {})",
        "Created".green().bold(),
        util::short_id(meta.checkpoint_id).yellow(),
        meta.stats.files,
        util::format_bytes(meta.stats.total_bytes)
    );
    Ok(())
}

pub fn list(base_dir: &Path, workbench: &str) -> Result<()> {
    let manager = util::open_manager(base_dir)?;
    let id = util::resolve_workbench(&manager, workbench)?;
    let checkpoints = manager.list_checkpoints(id)?;

    if checkpoints.is_empty() {
        println!("No checkpoints yet");
        return Ok(());
    }

    println!("{}", "Checkpoints".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for cp in checkpoints {
        let description = cp.description.as_deref().unwrap_or("");
        println!(
            "{}  {:<12} {:>4} files  {:>10}  {:<14} {}",
            util::short_id(cp.checkpoint_id).yellow(),
            cp.reason.to_string(),
            cp.stats.files,
            util::format_bytes(cp.stats.total_bytes),
            util::format_relative_time(cp.created_at_ms).dimmed(),
            description
        );
    }
    Ok(())
}

pub fn show(base_dir: &Path, workbench: &str, checkpoint: &str) -> Result<()> {
    let manager = util::open_manager(base_dir)?;
    let id = util::resolve_workbench(&manager, workbench)?;
    let cp_id = util::resolve_checkpoint(&manager, id, checkpoint)?;
    let meta = manager.get_checkpoint(id, cp_id)?;

    println!("{}", "Checkpoint".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("ID:          {}", meta.checkpoint_id.to_string().yellow());
    println!("Reason:      {}", meta.reason);
    println!(
        "Created:     {}",
        util::format_relative_time(meta.created_at_ms)
    );
    if let Some(description) = &meta.description {
        println!("Description: {}", description);
    }
    println!(
        "Contents:    {} files, {}",
        meta.stats.files,
        util::format_bytes(meta.stats.total_bytes)
    );
    Ok(())
}

pub fn restore(base_dir: &Path, workbench: &str, checkpoint: &str) -> Result<()> {
    let manager = util::open_manager(base_dir)?;
    let id = util::resolve_workbench(&manager, workbench)?;
    let cp_id = util::resolve_checkpoint(&manager, id, checkpoint)?;

    let progress = |phase: Phase| {
        let label = match phase {
            Phase::Validating => "validating",
            Phase::ConflictCheck => "conflict check",
            Phase::CheckpointPrePublish => "checkpoint (pre-restore)",
            Phase::SwapDirectories => "swapping directories",
            Phase::Finalizing => "finalizing",
            Phase::RollingBack => "rolling back",
        };
        println!("  {} {}", "→".dimmed(), label.dimmed());
    };

    manager.restore_checkpoint_with_progress(id, cp_id, &progress)?;
    println!(
        "{} published from checkpoint {}",
        "Restored".green().bold(),
        util::short_id(cp_id).yellow()
    );
    println!("  A pre_restore checkpoint of the previous state was kept.");
    Ok(())
}
