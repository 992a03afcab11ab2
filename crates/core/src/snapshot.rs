//! Snapshot materialization
//!
//! Copies a directory tree into a new location. Two modes:
//!
//! - [`SnapshotMode::Link`] hardlinks each file, falling back to a byte
//!   copy when linking fails (cross-device, permission, unsupported
//!   filesystem). Only valid when neither side will be edited in place —
//!   linked files share their inode, so an in-place write on one side
//!   would surface on the other.
//! - [`SnapshotMode::Copy`] always copies bytes. Required whenever the
//!   destination (or the source, later) is a mutable tree.
//!
//! The tree is built in a staging sibling and committed with a single
//! directory rename, so the destination is either fully present or
//! absent.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// How files are transferred into the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotMode {
    /// Hardlink per file, byte copy fallback. For immutable trees
    /// (checkpoint and revision snapshots).
    #[default]
    Link,
    /// Byte copy per file. For trees that will be edited in place
    /// (the draft, and published after a restore).
    Copy,
}

/// Materialize `source` at `dest`.
///
/// `dest` must not exist. The tree is assembled at `<dest>.staging` and
/// renamed into place as the final step. On any failure the staging path
/// is removed (best-effort) and `dest` is left absent.
pub fn materialize(source: &Path, dest: &Path, mode: SnapshotMode) -> Result<()> {
    if dest.exists() {
        bail!("snapshot destination already exists: {}", dest.display());
    }
    let staging = staging_path(dest)?;
    if staging.exists() {
        fs::remove_dir_all(&staging)
            .with_context(|| format!("Failed to clear stale staging: {}", staging.display()))?;
    }

    if let Err(e) = copy_tree(source, &staging, mode) {
        cleanup_staging(&staging);
        return Err(e);
    }

    if let Err(e) = fs::rename(&staging, dest) {
        cleanup_staging(&staging);
        return Err(e).with_context(|| {
            format!(
                "Failed to commit snapshot {} -> {}",
                staging.display(),
                dest.display()
            )
        });
    }
    Ok(())
}

/// Materialize `source` directly into `dest` without the staging rename.
///
/// For callers that already own a staging location and perform their own
/// atomic swap (the publish/restore coordinators). `dest` is created if
/// missing; existing files are replaced.
pub fn materialize_into(source: &Path, dest: &Path, mode: SnapshotMode) -> Result<()> {
    copy_tree(source, dest, mode)
}

fn staging_path(dest: &Path) -> Result<PathBuf> {
    let name = dest
        .file_name()
        .with_context(|| format!("Snapshot destination has no name: {}", dest.display()))?;
    let mut staged = name.to_os_string();
    staged.push(".staging");
    Ok(dest.with_file_name(staged))
}

fn cleanup_staging(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging) {
        if staging.exists() {
            tracing::warn!(
                "Failed to clean up snapshot staging {}: {}",
                staging.display(),
                e
            );
        }
    }
}

/// Recursively transfer `src` into `dest`, creating directories as needed.
fn copy_tree(src: &Path, dest: &Path, mode: SnapshotMode) -> Result<()> {
    let entries = fs::read_dir(src)
        .with_context(|| format!("Failed to read snapshot source: {}", src.display()))?;
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create snapshot dir: {}", dest.display()))?;
    for entry in entries {
        let entry = entry?;
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            // Workbench trees hold regular files; a symlink is an external
            // artifact and is not carried into snapshots.
            tracing::warn!("Skipping symlink in snapshot: {}", src_path.display());
            continue;
        }
        if file_type.is_dir() {
            copy_tree(&src_path, &dest_path, mode)?;
            continue;
        }
        transfer_file(&src_path, &dest_path, mode)?;
    }
    Ok(())
}

/// Hardlinks share the inode, so size and mtime are preserved for free;
/// byte copies carry the source mtime only as far as the filesystem does.
fn transfer_file(src: &Path, dest: &Path, mode: SnapshotMode) -> Result<()> {
    if dest.exists() {
        fs::remove_file(dest)?;
    }
    if mode == SnapshotMode::Link && fs::hard_link(src, dest).is_ok() {
        return Ok(());
    }
    fs::copy(src, dest)
        .with_context(|| format!("Failed to copy {} -> {}", src.display(), dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_materialize_copies_tree() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dest = temp.path().join("dest");

        write_file(&src.join("a.txt"), "alpha");
        write_file(&src.join("nested/b.txt"), "beta");

        materialize(&src, &dest, SnapshotMode::Link).unwrap();

        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "alpha");
        assert_eq!(
            fs::read_to_string(dest.join("nested/b.txt")).unwrap(),
            "beta"
        );
        // Staging must not be left behind
        assert!(!temp.path().join("dest.staging").exists());
    }

    #[test]
    fn test_materialize_refuses_existing_dest() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dest = temp.path().join("dest");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dest).unwrap();

        assert!(materialize(&src, &dest, SnapshotMode::Link).is_err());
    }

    #[test]
    fn test_materialize_missing_source_leaves_dest_absent() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("no_such_dir");
        let dest = temp.path().join("dest");

        assert!(materialize(&src, &dest, SnapshotMode::Link).is_err());
        assert!(!dest.exists());
        assert!(!temp.path().join("dest.staging").exists());
    }

    #[test]
    fn test_materialize_empty_source() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dest = temp.path().join("dest");
        fs::create_dir_all(&src).unwrap();

        materialize(&src, &dest, SnapshotMode::Copy).unwrap();
        assert!(dest.is_dir());
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_link_mode_shares_inode() {
        use std::os::unix::fs::MetadataExt;

        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dest = temp.path().join("dest");
        write_file(&src.join("file.txt"), "content");

        materialize(&src, &dest, SnapshotMode::Link).unwrap();

        let src_meta = fs::metadata(src.join("file.txt")).unwrap();
        let dest_meta = fs::metadata(dest.join("file.txt")).unwrap();
        assert_eq!(src_meta.ino(), dest_meta.ino());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_mode_isolates_inode() {
        use std::os::unix::fs::MetadataExt;

        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dest = temp.path().join("dest");
        write_file(&src.join("file.txt"), "content");

        materialize(&src, &dest, SnapshotMode::Copy).unwrap();

        let src_meta = fs::metadata(src.join("file.txt")).unwrap();
        let dest_meta = fs::metadata(dest.join("file.txt")).unwrap();
        assert_ne!(src_meta.ino(), dest_meta.ino());

        // In-place edits on the copy never leak back
        fs::write(dest.join("file.txt"), "edited").unwrap();
        assert_eq!(
            fs::read_to_string(src.join("file.txt")).unwrap(),
            "content"
        );
    }
}
