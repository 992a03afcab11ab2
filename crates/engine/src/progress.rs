//! Transaction progress reporting
//!
//! Publish and restore emit a small phase stream so a UI can render
//! meaningful status without polling engine internals.

use serde::Serialize;

/// Phases of a publish/restore transaction, in order of occurrence.
/// `RollingBack` only appears on the failure path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Validating,
    ConflictCheck,
    CheckpointPrePublish,
    SwapDirectories,
    Finalizing,
    RollingBack,
}

/// Receives phase transitions during a transaction.
pub trait ProgressSink {
    fn phase(&self, phase: Phase);
}

/// Discards all progress.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn phase(&self, _phase: Phase) {}
}

impl<F: Fn(Phase)> ProgressSink for F {
    fn phase(&self, phase: Phase) {
        self(phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_closure_sink_records_phases() {
        let seen = RefCell::new(Vec::new());
        let sink = |phase: Phase| seen.borrow_mut().push(phase);

        sink.phase(Phase::Validating);
        sink.phase(Phase::Finalizing);

        assert_eq!(*seen.borrow(), vec![Phase::Validating, Phase::Finalizing]);
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        let json = serde_json::to_string(&Phase::CheckpointPrePublish).unwrap();
        assert_eq!(json, "\"checkpoint_pre_publish\"");
    }
}
