//! Draft revision commands
//!
//! Invoked by the workshop loop after each write, and on rewind.

use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;
use workbench_engine::EngineError;

pub fn snapshot(base_dir: &Path, workbench: &str, pointer: &str) -> Result<()> {
    let manager = util::open_manager(base_dir)?;
    let id = util::resolve_workbench(&manager, workbench)?;

    let record = manager.snapshot_revision(id, pointer)?;
    let short_rev = &record.revision_id[..8];
    println!(
        "{} revision {} at {} (seq {}, draft: {})",
        "Recorded".green().bold(),
        short_rev.yellow(),
        pointer,
        record.seq,
        if record.has_draft { "yes" } else { "no" }
    );
    Ok(())
}

pub fn restore(base_dir: &Path, workbench: &str, pointer: &str) -> Result<()> {
    let manager = util::open_manager(base_dir)?;
    let id = util::resolve_workbench(&manager, workbench)?;

    match manager.restore_revision(id, pointer) {
        Ok(record) if record.has_draft => {
            println!(
                "{} draft to revision at {}",
                "Rewound".green().bold(),
                pointer
            );
            Ok(())
        }
        Ok(_) => {
            println!(
                "{} to a point before the draft existed; draft removed",
                "Rewound".green().bold()
            );
            Ok(())
        }
        Err(EngineError::RevisionUnavailable(reason)) => {
            println!("{}", "Revision unavailable".red().bold());
            println!("{reason}");
            println!("Choose one:");
            println!(
                "  {} rewind history only (skip file restoration)",
                "•".dimmed()
            );
            println!(
                "  {} discard the draft and rewind:  wb draft discard {}",
                "•".dimmed(),
                workbench
            );
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
