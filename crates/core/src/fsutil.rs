//! Atomic metadata I/O and small filesystem helpers

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use walkdir::WalkDir;

/// File count and byte total for a directory tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirStats {
    pub files: u64,
    pub total_bytes: u64,
}

/// Write `value` as pretty JSON via write-to-temp-then-rename.
///
/// The temp file lives next to the target so the final rename stays on
/// one filesystem. The file is fsynced before the rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("Metadata path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create metadata dir: {}", parent.display()))?;

    let name = path
        .file_name()
        .with_context(|| format!("Metadata path has no name: {}", path.display()))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(name);
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let data = serde_json::to_vec_pretty(value)?;
    let mut file = File::create(&tmp)
        .with_context(|| format!("Failed to create temp file: {}", tmp.display()))?;
    if let Err(e) = file.write_all(&data).and_then(|_| file.sync_all()) {
        drop(file);
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to write {}", tmp.display()));
    }
    drop(file);

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to commit {}", path.display()));
    }
    Ok(())
}

/// Read a JSON metadata file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path)
        .with_context(|| format!("Failed to read metadata: {}", path.display()))?;
    serde_json::from_slice(&data)
        .with_context(|| format!("Failed to parse metadata: {}", path.display()))
}

/// Read a JSON metadata file, returning `None` when it does not exist.
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(serde_json::from_slice(&data).with_context(|| {
            format!("Failed to parse metadata: {}", path.display())
        })?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read metadata: {}", path.display())),
    }
}

/// Count files and bytes under a directory. Unreadable entries are skipped.
pub fn dir_stats(dir: &Path) -> DirStats {
    let mut stats = DirStats::default();
    if !dir.is_dir() {
        return stats;
    }
    for entry in WalkDir::new(dir).follow_links(false) {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        stats.files += 1;
        stats.total_bytes += meta.len();
    }
    stats
}

/// Bytes available to unprivileged writers on the filesystem holding `path`.
#[cfg(unix)]
pub fn available_space(path: &Path) -> Result<u64> {
    let stat = nix::sys::statvfs::statvfs(path)
        .with_context(|| format!("statvfs failed for {}", path.display()))?;
    Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64)
}

/// Non-Unix platforms have no statvfs; report unbounded space and let the
/// write itself fail if the disk is actually full.
#[cfg(not(unix))]
pub fn available_space(_path: &Path) -> Result<u64> {
    Ok(u64::MAX)
}

/// Remove a directory tree if present. Missing is not an error.
pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// Remove a file if present. Missing is not an error.
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
