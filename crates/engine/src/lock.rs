//! Per-workbench mutual exclusion
//!
//! Every mutating operation runs under the workbench's lock for its full
//! duration; read-only listings do not take it. The table is owned by the
//! manager instance and handed around by reference, not a process-wide
//! singleton. Acquisition honors a timeout so a stuck transaction cannot
//! wedge callers forever.

use crate::error::{EngineError, Result};
use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::sync::Arc;
use std::time::Duration;
use ulid::Ulid;

/// Map from workbench id to its advisory lock
#[derive(Default)]
pub struct LockTable {
    locks: DashMap<Ulid, Arc<Mutex<()>>>,
}

/// Held for the full duration of a mutating operation; releases on drop.
pub struct WorkbenchGuard {
    workbench_id: Ulid,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl WorkbenchGuard {
    pub fn workbench_id(&self) -> Ulid {
        self.workbench_id
    }
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `workbench_id`, waiting at most `timeout`.
    pub fn acquire(&self, workbench_id: Ulid, timeout: Duration) -> Result<WorkbenchGuard> {
        let lock = self
            .locks
            .entry(workbench_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match lock.try_lock_arc_for(timeout) {
            Some(guard) => Ok(WorkbenchGuard {
                workbench_id,
                _guard: guard,
            }),
            None => Err(EngineError::LockTimeout(format!(
                "workbench {workbench_id} is busy (waited {timeout:?})"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_acquire_and_release() {
        let table = LockTable::new();
        let id = Ulid::new();

        let guard = table.acquire(id, Duration::from_millis(50)).unwrap();
        drop(guard);

        // Reacquire after release
        let guard = table.acquire(id, Duration::from_millis(50)).unwrap();
        assert_eq!(guard.workbench_id(), id);
    }

    #[test]
    fn test_contention_times_out() {
        let table = Arc::new(LockTable::new());
        let id = Ulid::new();

        let _held = table.acquire(id, Duration::from_millis(50)).unwrap();

        let table2 = Arc::clone(&table);
        let result = thread::spawn(move || table2.acquire(id, Duration::from_millis(50)))
            .join()
            .unwrap();

        assert!(matches!(result, Err(EngineError::LockTimeout(_))));
    }

    #[test]
    fn test_independent_workbenches_do_not_contend() {
        let table = LockTable::new();
        let a = Ulid::new();
        let b = Ulid::new();

        let _guard_a = table.acquire(a, Duration::from_millis(50)).unwrap();
        let guard_b = table.acquire(b, Duration::from_millis(50));
        assert!(guard_b.is_ok());
    }
}
