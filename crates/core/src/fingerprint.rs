//! Directory fingerprinting
//!
//! A fingerprint is a SHA-256 digest over the sorted listing of
//! (relative path, size, mtime) for every file under a directory. It is
//! the shared definition of "unchanged" between draft creation and the
//! publish conflict check: if any file is added, removed, resized or
//! rewritten, the fingerprint moves.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/// Hex-encoded SHA-256 digest of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint of a directory tree.
///
/// A missing or empty directory hashes the empty listing, so a freshly
/// created workbench has a stable, well-defined fingerprint.
pub fn fingerprint_dir(dir: &Path) -> Result<Fingerprint> {
    let mut listing: Vec<(String, u64, u128)> = Vec::new();

    if dir.is_dir() {
        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = entry
                .with_context(|| format!("Failed to walk directory: {}", dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(dir)
                .expect("walked path is under root");
            let meta = entry.metadata()?;
            let mtime_ms = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis())
                .unwrap_or(0);
            listing.push((normalize_rel_path(rel), meta.len(), mtime_ms));
        }
    }

    listing.sort();

    let mut hasher = Sha256::new();
    for (path, size, mtime_ms) in &listing {
        hasher.update(path.as_bytes());
        hasher.update(b"\n");
        hasher.update(size.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(mtime_ms.to_string().as_bytes());
        hasher.update(b"\n");
    }
    Ok(Fingerprint(hex_encode(&hasher.finalize())))
}

/// Normalize a relative path to forward slashes so fingerprints are
/// stable across platforms.
fn normalize_rel_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_and_missing_dirs_agree() {
        let temp = TempDir::new().unwrap();
        let empty = temp.path().join("empty");
        fs::create_dir_all(&empty).unwrap();
        let missing = temp.path().join("missing");

        let a = fingerprint_dir(&empty).unwrap();
        let b = fingerprint_dir(&missing).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_stable_for_unchanged_tree() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "hello").unwrap();

        let first = fingerprint_dir(temp.path()).unwrap();
        let second = fingerprint_dir(temp.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fingerprint_changes_on_new_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "hello").unwrap();
        let before = fingerprint_dir(temp.path()).unwrap();

        fs::write(temp.path().join("b.txt"), "world").unwrap();
        let after = fingerprint_dir(temp.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_fingerprint_changes_on_resize() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "hello").unwrap();
        let before = fingerprint_dir(temp.path()).unwrap();

        fs::write(temp.path().join("a.txt"), "hello world").unwrap();
        let after = fingerprint_dir(temp.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_fingerprint_sees_nested_files() {
        let temp = TempDir::new().unwrap();
        let before = fingerprint_dir(temp.path()).unwrap();

        fs::create_dir_all(temp.path().join("sub")).unwrap();
        fs::write(temp.path().join("sub/a.txt"), "x").unwrap();
        let after = fingerprint_dir(temp.path()).unwrap();
        assert_ne!(before, after);
    }
}
