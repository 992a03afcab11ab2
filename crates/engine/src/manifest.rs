//! Published file manifest
//!
//! `meta/files.json` lists what the published tree holds (relative path,
//! size, mtime). It is rebuilt after every publish and restore, and the
//! copy inside each checkpoint's `meta_snapshot/` is the metadata subset
//! a restore brings back. Underscore-prefixed names at the tree root are
//! agent scratch files and are excluded.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;
use workbench_core::{read_json_opt, write_json_atomic};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub size: u64,
    pub modified_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileManifest {
    pub schema_version: u32,
    pub files: Vec<ManifestEntry>,
}

impl Default for FileManifest {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            files: Vec::new(),
        }
    }
}

impl FileManifest {
    /// Build a manifest by scanning a directory tree.
    pub fn scan(dir: &Path) -> Result<Self> {
        let mut files = Vec::new();
        if dir.is_dir() {
            for entry in WalkDir::new(dir).follow_links(false) {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry.path().strip_prefix(dir).expect("under root");
                let rel_str = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if is_scratch_name(&rel_str) {
                    continue;
                }
                let meta = entry.metadata()?;
                let modified_at_ms = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0);
                files.push(ManifestEntry {
                    path: rel_str,
                    size: meta.len(),
                    modified_at_ms,
                });
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(Self {
            schema_version: SCHEMA_VERSION,
            files,
        })
    }

    /// Load a manifest file; missing means empty.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(read_json_opt(path)?.unwrap_or_default())
    }

    pub fn store(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}

/// Scratch files are root-level names starting with `_`.
pub fn is_scratch_name(rel_path: &str) -> bool {
    !rel_path.contains('/') && rel_path.starts_with('_')
}

/// Delete root-level scratch files from a tree. They never persist past
/// publish.
pub fn delete_scratch_files(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) && name.starts_with('_') {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                tracing::warn!("Failed to remove scratch file {}: {}", name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_sorts_and_skips_scratch() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.txt"), "bb").unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();
        fs::write(temp.path().join("_scratch.txt"), "tmp").unwrap();
        fs::create_dir_all(temp.path().join("sub")).unwrap();
        fs::write(temp.path().join("sub/_kept.txt"), "nested underscore").unwrap();

        let manifest = FileManifest::scan(temp.path()).unwrap();
        let paths: Vec<_> = manifest.files.iter().map(|f| f.path.as_str()).collect();
        // Root-level underscore excluded; nested one is ordinary content
        assert_eq!(paths, vec!["a.txt", "b.txt", "sub/_kept.txt"]);
        assert_eq!(manifest.files[0].size, 1);
    }

    #[test]
    fn test_load_missing_is_empty() {
        let temp = TempDir::new().unwrap();
        let manifest = FileManifest::load(&temp.path().join("files.json")).unwrap();
        assert!(manifest.files.is_empty());
        assert_eq!(manifest.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_store_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("doc.md"), "hello").unwrap();
        let manifest = FileManifest::scan(temp.path()).unwrap();

        let path = temp.path().join("meta/files.json");
        manifest.store(&path).unwrap();
        let loaded = FileManifest::load(&path).unwrap();
        assert_eq!(loaded.files, manifest.files);
    }

    #[test]
    fn test_delete_scratch_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("_notes.txt"), "x").unwrap();
        fs::write(temp.path().join("keep.txt"), "y").unwrap();

        delete_scratch_files(temp.path());
        assert!(!temp.path().join("_notes.txt").exists());
        assert!(temp.path().join("keep.txt").exists());
    }
}
