//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use std::path::Path;
use ulid::Ulid;
use workbench_engine::{EngineConfig, WorkbenchManager};

/// Open the manager over the base directory. Startup recovery runs here,
/// before any command executes.
pub fn open_manager(base_dir: &Path) -> Result<WorkbenchManager> {
    WorkbenchManager::open(base_dir, EngineConfig::default())
        .with_context(|| format!("Failed to open workbench store at {}", base_dir.display()))
}

/// Resolve a workbench reference to its ID.
/// Supports:
/// - Full ULID: "01HN8XYZ..."
/// - Unique ULID prefix: "01HN8"
/// - Exact display name: "Quarterly report"
pub fn resolve_workbench(manager: &WorkbenchManager, reference: &str) -> Result<Ulid> {
    if let Ok(id) = Ulid::from_string(reference) {
        manager.get(id)?;
        return Ok(id);
    }

    let all = manager.list()?;

    let upper = reference.to_uppercase();
    let by_prefix: Vec<_> = all
        .iter()
        .filter(|wb| wb.id.to_string().starts_with(&upper))
        .collect();
    match by_prefix.len() {
        1 => return Ok(by_prefix[0].id),
        n if n > 1 => anyhow::bail!(
            "Ambiguous workbench prefix '{}': matches {} workbenches",
            reference,
            n
        ),
        _ => {}
    }

    let by_name: Vec<_> = all.iter().filter(|wb| wb.name == reference).collect();
    match by_name.len() {
        1 => Ok(by_name[0].id),
        0 => anyhow::bail!("Workbench not found: {}", reference),
        n => anyhow::bail!("Ambiguous workbench name '{}': matches {}", reference, n),
    }
}

/// Resolve a checkpoint reference (full ULID or unique prefix) within a
/// workbench.
pub fn resolve_checkpoint(
    manager: &WorkbenchManager,
    workbench: Ulid,
    reference: &str,
) -> Result<Ulid> {
    if let Ok(id) = Ulid::from_string(reference) {
        manager.get_checkpoint(workbench, id)?;
        return Ok(id);
    }

    let upper = reference.to_uppercase();
    let matching: Vec<_> = manager
        .list_checkpoints(workbench)?
        .into_iter()
        .filter(|cp| cp.checkpoint_id.to_string().starts_with(&upper))
        .collect();
    match matching.len() {
        1 => Ok(matching[0].checkpoint_id),
        0 => anyhow::bail!("Checkpoint not found: {}", reference),
        n => anyhow::bail!(
            "Ambiguous checkpoint prefix '{}': matches {} checkpoints",
            reference,
            n
        ),
    }
}

/// Render a millisecond timestamp as a relative age ("3m ago").
pub fn format_relative_time(ts_ms: u64) -> String {
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let delta_secs = now_ms.saturating_sub(ts_ms) / 1000;

    match delta_secs {
        0..=59 => format!("{}s ago", delta_secs),
        60..=3599 => format!("{}m ago", delta_secs / 60),
        3600..=86399 => format!("{}h ago", delta_secs / 3600),
        _ => format!("{}d ago", delta_secs / 86400),
    }
}

/// Render a byte count with a binary-unit suffix.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Short display form of a ULID.
pub fn short_id(id: Ulid) -> String {
    id.to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_short_id_length() {
        assert_eq!(short_id(Ulid::new()).len(), 8);
    }
}
