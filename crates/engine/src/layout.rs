//! On-disk layout of a workbench
//!
//! All paths the engine touches hang off a single root:
//!
//! ```text
//! <root>/
//!   published/                        approved tree
//!   published.prev                    aside during publish/restore swap
//!   published.restore-staging         restore staging
//!   draft/                            active mutable tree (optional)
//!   draft.restore-staging             revision restore staging
//!   meta/
//!     workbench.json                  identity + generation counter
//!     draft.json                      active draft record (optional)
//!     files.json                      published file manifest
//!     events.jsonl                    append-only audit log
//!     transaction.json                in-flight transaction marker (optional)
//!     checkpoints/<id>.json           checkpoint metadata
//!     checkpoints/<id>/published_snapshot/
//!     checkpoints/<id>/meta_snapshot/
//!     draft_revisions/<rev_id>/       revision record + draft snapshot
//! ```

use std::path::{Path, PathBuf};

/// Path helpers for one workbench directory tree
#[derive(Debug, Clone)]
pub struct WorkbenchLayout {
    root: PathBuf,
}

impl WorkbenchLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn published(&self) -> PathBuf {
        self.root.join("published")
    }

    pub fn published_prev(&self) -> PathBuf {
        self.root.join("published.prev")
    }

    pub fn published_restore_staging(&self) -> PathBuf {
        self.root.join("published.restore-staging")
    }

    pub fn draft(&self) -> PathBuf {
        self.root.join("draft")
    }

    pub fn draft_restore_staging(&self) -> PathBuf {
        self.root.join("draft.restore-staging")
    }

    pub fn meta(&self) -> PathBuf {
        self.root.join("meta")
    }

    pub fn workbench_file(&self) -> PathBuf {
        self.meta().join("workbench.json")
    }

    pub fn draft_file(&self) -> PathBuf {
        self.meta().join("draft.json")
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.meta().join("files.json")
    }

    pub fn events_file(&self) -> PathBuf {
        self.meta().join("events.jsonl")
    }

    pub fn transaction_file(&self) -> PathBuf {
        self.meta().join("transaction.json")
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.meta().join("checkpoints")
    }

    pub fn checkpoint_meta_file(&self, id: &str) -> PathBuf {
        self.checkpoints_dir().join(format!("{id}.json"))
    }

    pub fn checkpoint_dir(&self, id: &str) -> PathBuf {
        self.checkpoints_dir().join(id)
    }

    pub fn checkpoint_staging(&self, id: &str) -> PathBuf {
        self.checkpoints_dir().join(format!("{id}.staging"))
    }

    pub fn published_snapshot(&self, id: &str) -> PathBuf {
        self.checkpoint_dir(id).join("published_snapshot")
    }

    pub fn meta_snapshot(&self, id: &str) -> PathBuf {
        self.checkpoint_dir(id).join("meta_snapshot")
    }

    pub fn revisions_dir(&self) -> PathBuf {
        self.meta().join("draft_revisions")
    }

    pub fn revision_dir(&self, rev_id: &str) -> PathBuf {
        self.revisions_dir().join(rev_id)
    }

    pub fn revision_staging(&self, rev_id: &str) -> PathBuf {
        self.revisions_dir().join(format!("{rev_id}.staging"))
    }

    pub fn revision_record_file(&self, rev_id: &str) -> PathBuf {
        self.revision_dir(rev_id).join("rev.json")
    }

    pub fn revision_draft_snapshot(&self, rev_id: &str) -> PathBuf {
        self.revision_dir(rev_id).join("draft_snapshot")
    }

    pub fn revision_draft_record(&self, rev_id: &str) -> PathBuf {
        self.revision_dir(rev_id).join("draft.json")
    }

    /// The tree collaborators should read and write: draft when one is
    /// active, published otherwise.
    pub fn active_view(&self) -> PathBuf {
        let draft = self.draft();
        if draft.is_dir() {
            draft
        } else {
            self.published()
        }
    }
}
