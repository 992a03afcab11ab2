//! Draft lifecycle commands

use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;

pub fn create(base_dir: &Path, workbench: &str, source: &str) -> Result<()> {
    let manager = util::open_manager(base_dir)?;
    let id = util::resolve_workbench(&manager, workbench)?;

    let state = manager.create_draft(id, source)?;
    println!(
        "{} draft {} (from published, source: {})",
        "Created".green().bold(),
        util::short_id(state.draft_id).yellow(),
        state.source
    );
    println!("  All writes now land in draft/ until publish or discard.");
    Ok(())
}

pub fn discard(base_dir: &Path, workbench: &str) -> Result<()> {
    let manager = util::open_manager(base_dir)?;
    let id = util::resolve_workbench(&manager, workbench)?;

    manager.discard_draft(id)?;
    println!(
        "{} draft (published untouched)",
        "Discarded".yellow().bold()
    );
    Ok(())
}
