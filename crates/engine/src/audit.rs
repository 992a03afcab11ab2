//! Append-only audit log
//!
//! One JSON object per line in `meta/events.jsonl`. Audit failures are
//! logged and swallowed; they must never fail the operation that emitted
//! them.

use crate::layout::WorkbenchLayout;
use crate::now_ms;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use ulid::Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    WorkbenchCreated,
    DraftCreated,
    DraftDiscarded,
    Published,
    CheckpointCreated,
    CheckpointRestored,
    RevisionRestored,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event: AuditEventKind,
    pub at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_id: Option<Ulid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<Ulid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn new(event: AuditEventKind) -> Self {
        Self {
            event,
            at_ms: now_ms(),
            draft_id: None,
            checkpoint_id: None,
            revision_id: None,
            detail: None,
        }
    }

    pub fn draft(mut self, id: Ulid) -> Self {
        self.draft_id = Some(id);
        self
    }

    pub fn checkpoint(mut self, id: Ulid) -> Self {
        self.checkpoint_id = Some(id);
        self
    }

    pub fn revision(mut self, id: impl Into<String>) -> Self {
        self.revision_id = Some(id.into());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Append an event to the workbench audit log. Best-effort.
pub fn append(layout: &WorkbenchLayout, event: AuditEvent) {
    if let Err(e) = try_append(layout, &event) {
        tracing::warn!(
            "Failed to append audit event {:?} for {}: {}",
            event.event,
            layout.root().display(),
            e
        );
    }
}

fn try_append(layout: &WorkbenchLayout, event: &AuditEvent) -> anyhow::Result<()> {
    let path = layout.events_file();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    file.write_all(&line)?;
    Ok(())
}

/// Read all events back. Used by status displays and tests; malformed
/// lines are skipped.
pub fn read_all(layout: &WorkbenchLayout) -> Vec<AuditEvent> {
    let Ok(data) = std::fs::read_to_string(layout.events_file()) else {
        return Vec::new();
    };
    data.lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}
