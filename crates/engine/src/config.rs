//! Engine configuration

use std::time::Duration;

/// Behavior when checkpoint storage stays over budget after pruning.
///
/// The source design left this open; it is a policy knob rather than a
/// hard-coded choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskPressurePolicy {
    /// Prune what is allowed and stay silent
    BestEffort,
    /// Prune what is allowed and log a warning
    Warn,
    /// Fail the checkpoint create (and the operation that required it)
    Fail,
}

/// Retention limits and operational knobs, passed to the manager at
/// construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Newest `auto`-reason checkpoints retained (default 200)
    pub max_auto_checkpoints: usize,
    /// Newest `manual`-reason checkpoints retained (default 50)
    pub max_manual_checkpoints: usize,
    /// Newest draft revisions retained (default 200)
    pub max_draft_revisions: usize,
    /// Maximum wait for the per-workbench lock (default 30s)
    pub lock_timeout: Duration,
    /// Extra free space required beyond the projected copy size (default 64 MiB)
    pub free_space_headroom_bytes: u64,
    /// Total bytes allowed for checkpoint storage; `None` is unbounded
    pub checkpoint_storage_budget_bytes: Option<u64>,
    /// What to do when storage stays over budget after pruning
    pub disk_pressure_policy: DiskPressurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_auto_checkpoints: 200,
            max_manual_checkpoints: 50,
            max_draft_revisions: 200,
            lock_timeout: Duration::from_secs(30),
            free_space_headroom_bytes: 64 * 1024 * 1024,
            checkpoint_storage_budget_bytes: None,
            disk_pressure_policy: DiskPressurePolicy::Warn,
        }
    }
}
