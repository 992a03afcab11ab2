//! List workbenches

use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;

pub fn run(base_dir: &Path) -> Result<()> {
    let manager = util::open_manager(base_dir)?;
    let workbenches = manager.list()?;

    if workbenches.is_empty() {
        println!("No workbenches in {}", base_dir.display());
        return Ok(());
    }

    println!("{}", "Workbenches".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for wb in workbenches {
        let draft_flag = match manager.draft_state(wb.id)? {
            Some(_) => "draft".yellow().to_string(),
            None => "clean".dimmed().to_string(),
        };
        println!(
            "{}  {:<30} gen {:<4} {:<8} {}",
            util::short_id(wb.id).yellow(),
            wb.name,
            wb.generation,
            draft_flag,
            util::format_relative_time(wb.updated_at_ms).dimmed()
        );
    }
    Ok(())
}
