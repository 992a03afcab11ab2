//! Show workbench status

use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;
use workbench_core::dir_stats;
use workbench_engine::WorkbenchLayout;

pub fn run(base_dir: &Path, workbench: &str) -> Result<()> {
    let manager = util::open_manager(base_dir)?;
    let id = util::resolve_workbench(&manager, workbench)?;
    let wb = manager.get(id)?;
    let layout = WorkbenchLayout::new(base_dir.join(id.to_string()));

    println!("{}", "Workbench Status".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("Name:        {}", wb.name.cyan());
    println!("ID:          {}", wb.id.to_string().yellow());
    println!("Generation:  {}", wb.generation);
    println!(
        "Updated:     {}",
        util::format_relative_time(wb.updated_at_ms)
    );
    println!();

    let published_stats = dir_stats(&layout.published());
    println!(
        "Published:   {} files, {}",
        published_stats.files,
        util::format_bytes(published_stats.total_bytes)
    );

    match manager.draft_state(id)? {
        Some(state) => {
            let draft_stats = dir_stats(&layout.draft());
            println!(
                "Draft:       {} ({} files, {}, created {} by {})",
                "active".yellow(),
                draft_stats.files,
                util::format_bytes(draft_stats.total_bytes),
                util::format_relative_time(state.created_at_ms),
                state.source
            );
        }
        None => println!("Draft:       {}", "none".dimmed()),
    }
    println!();

    let checkpoints = manager.list_checkpoints(id)?;
    println!("Checkpoints: {}", checkpoints.len());
    for cp in checkpoints.iter().take(5) {
        println!(
            "  {}  {:<12} {:<10} {}",
            util::short_id(cp.checkpoint_id).yellow(),
            cp.reason.to_string(),
            util::format_bytes(cp.stats.total_bytes),
            util::format_relative_time(cp.created_at_ms).dimmed()
        );
    }
    if checkpoints.len() > 5 {
        println!("  ... and {} more", checkpoints.len() - 5);
    }
    Ok(())
}
