//! Create a new workbench

use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;

pub fn run(base_dir: &Path, name: &str) -> Result<()> {
    let manager = util::open_manager(base_dir)?;
    let wb = manager.create(name)?;

    println!(
        "{} workbench {} ({})",
        "Created".green().bold(),
        wb.id.to_string().yellow(),
        wb.name
    );
    println!("  Root: {}", base_dir.join(wb.id.to_string()).display());
    Ok(())
}
