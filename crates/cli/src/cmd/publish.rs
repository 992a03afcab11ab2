//! Publish the draft

use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;
use workbench_engine::{EngineError, Phase};

pub fn run(base_dir: &Path, workbench: &str) -> Result<()> {
    let manager = util::open_manager(base_dir)?;
    let id = util::resolve_workbench(&manager, workbench)?;

    let progress = |phase: Phase| {
        let label = match phase {
            Phase::Validating => "validating",
            Phase::ConflictCheck => "conflict check",
            Phase::CheckpointPrePublish => "checkpoint (pre-publish)",
            Phase::SwapDirectories => "swapping directories",
            Phase::Finalizing => "finalizing",
            Phase::RollingBack => "rolling back",
        };
        println!("  {} {}", "→".dimmed(), label.dimmed());
    };

    match manager.publish_with_progress(id, &progress) {
        Ok(outcome) => {
            println!(
                "{} checkpoint {}",
                "Published".green().bold(),
                util::short_id(outcome.checkpoint_id).yellow()
            );
            Ok(())
        }
        Err(EngineError::PublishConflict) => {
            println!("{}", "Publish conflict".red().bold());
            println!("Published changed outside this draft since the draft was created.");
            println!("Choose one:");
            println!(
                "  {} discard the draft and start over:  wb draft discard {}",
                "•".dimmed(),
                workbench
            );
            println!(
                "  {} restore published from a checkpoint: wb checkpoint restore {} <id>",
                "•".dimmed(),
                workbench
            );
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
