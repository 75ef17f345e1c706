//! Holder tracking for shared stream processors.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct LeaseTable {
    /// Processor name to the migrations holding it, one entry per run.
    holders: HashMap<String, Vec<String>>,
    /// Migrations whose local runs have all returned.
    finished: HashSet<String>,
}

/// Tracks, per processor, the local runs currently using it.
#[derive(Debug, Default)]
pub struct ProcessorLeases {
    table: Mutex<LeaseTable>,
}

impl ProcessorLeases {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LeaseTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `migration` as one more holder of `processor`.
    pub fn acquire(self: &Arc<Self>, processor: &str, migration: &str) -> ProcessorLease {
        let mut table = self.lock();
        table
            .holders
            .entry(processor.to_string())
            .or_default()
            .push(migration.to_string());
        table.finished.remove(migration);
        ProcessorLease {
            leases: Arc::clone(self),
            processor: processor.to_string(),
            migration: migration.to_string(),
            released: false,
        }
    }

    /// Number of live leases on `processor`.
    pub fn holders(&self, processor: &str) -> usize {
        self.lock().holders.get(processor).map_or(0, Vec::len)
    }

    /// Whether `migration` ran on this node and none of its runs holds a
    /// lease any more. A running status stored for such a migration is
    /// stale.
    pub fn finished_locally(&self, migration: &str) -> bool {
        self.lock().finished.contains(migration)
    }

    /// Drop one hold and report whether `processor` has no holder left.
    fn decrement(&self, processor: &str, migration: &str) -> bool {
        let mut table = self.lock();
        let Some(holders) = table.holders.get_mut(processor) else {
            return false;
        };
        if let Some(index) = holders.iter().position(|held| held == migration) {
            holders.remove(index);
        }
        let last = holders.is_empty();
        if last {
            table.holders.remove(processor);
        }
        if !table
            .holders
            .values()
            .any(|held| held.iter().any(|id| id == migration))
        {
            table.finished.insert(migration.to_string());
        }
        last
    }
}

/// A run's hold on a processor. Dropping it releases the hold.
#[derive(Debug)]
pub struct ProcessorLease {
    leases: Arc<ProcessorLeases>,
    processor: String,
    migration: String,
    released: bool,
}

impl ProcessorLease {
    pub fn processor(&self) -> &str {
        &self.processor
    }

    /// Release the hold. Returns `true` when no other local run holds the
    /// processor any more.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.leases.decrement(&self.processor, &self.migration)
    }
}

impl Drop for ProcessorLease {
    fn drop(&mut self) {
        if !self.released {
            self.leases.decrement(&self.processor, &self.migration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_release_reports_true() {
        let leases = Arc::new(ProcessorLeases::new());
        let a = leases.acquire("p", "m1");
        let b = leases.acquire("p", "m2");
        assert_eq!(leases.holders("p"), 2);

        assert!(!b.release());
        assert_eq!(leases.holders("p"), 1);
        assert!(a.release());
        assert_eq!(leases.holders("p"), 0);
    }

    #[test]
    fn test_drop_releases_silently() {
        let leases = Arc::new(ProcessorLeases::new());
        let a = leases.acquire("p", "m1");
        {
            let _b = leases.acquire("p", "m2");
        }
        assert_eq!(leases.holders("p"), 1);
        assert_eq!(a.processor(), "p");
        assert!(a.release());
    }

    #[test]
    fn test_processors_are_independent() {
        let leases = Arc::new(ProcessorLeases::new());
        let a = leases.acquire("p1", "m1");
        let b = leases.acquire("p2", "m2");
        assert!(a.release());
        assert_eq!(leases.holders("p2"), 1);
        assert!(b.release());
    }

    #[test]
    fn test_finished_once_every_run_released() {
        let leases = Arc::new(ProcessorLeases::new());
        assert!(!leases.finished_locally("m1"));

        let a = leases.acquire("p", "m1");
        let b = leases.acquire("p", "m1");
        assert!(!leases.finished_locally("m1"));

        assert!(!a.release());
        assert!(!leases.finished_locally("m1"));
        assert!(b.release());
        assert!(leases.finished_locally("m1"));

        let c = leases.acquire("p", "m1");
        assert!(!leases.finished_locally("m1"));
        drop(c);
        assert!(leases.finished_locally("m1"));
    }
}
