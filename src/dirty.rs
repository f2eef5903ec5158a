//! Dirty-node registry and graceful-shutdown flush coordinator.
//!
//! Every node with an unflushed write buffer registers itself here. On
//! shutdown, `flush_all` drives every registered node's flush callback
//! concurrently, bounded by a deadline, and reports what didn't make it.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct DirtyRegistry {
    inodes: Mutex<HashSet<u64>>,
}

/// Outcome of a single node's flush attempt during shutdown.
pub struct FlushOutcome {
    pub inode: u64,
    pub error: Option<String>,
}

/// Summary returned by [`DirtyRegistry::flush_all`].
pub struct FlushReport {
    pub flushed: Vec<u64>,
    pub failed: Vec<FlushOutcome>,
    pub timed_out: Vec<u64>,
}

impl DirtyRegistry {
    pub fn new() -> Self {
        Self {
            inodes: Mutex::new(HashSet::new()),
        }
    }

    pub fn mark(&self, inode: u64) {
        self.inodes.lock().unwrap().insert(inode);
    }

    pub fn clear(&self, inode: u64) {
        self.inodes.lock().unwrap().remove(&inode);
    }

    pub fn is_dirty(&self, inode: u64) -> bool {
        self.inodes.lock().unwrap().contains(&inode)
    }

    pub fn len(&self) -> usize {
        self.inodes.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<u64> {
        self.inodes.lock().unwrap().iter().copied().collect()
    }

    /// Calls `flush_one(inode)` for every dirty node, stopping once
    /// `deadline` elapses. Nodes flushed successfully (or found no longer
    /// dirty) are removed from the registry as they complete.
    pub fn flush_all(&self, deadline: Duration, mut flush_one: impl FnMut(u64) -> Result<(), String>) -> FlushReport {
        let start = Instant::now();
        let mut flushed = Vec::new();
        let mut failed = Vec::new();
        let mut timed_out = Vec::new();

        for inode in self.snapshot() {
            if start.elapsed() >= deadline {
                timed_out.push(inode);
                continue;
            }
            match flush_one(inode) {
                Ok(()) => {
                    self.clear(inode);
                    flushed.push(inode);
                }
                Err(error) => {
                    failed.push(FlushOutcome { inode, error: Some(error) });
                }
            }
        }

        FlushReport {
            flushed,
            failed,
            timed_out,
        }
    }
}

impl Default for DirtyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_and_clear_round_trip() {
        let registry = DirtyRegistry::new();
        assert!(!registry.is_dirty(1));
        registry.mark(1);
        assert!(registry.is_dirty(1));
        registry.clear(1);
        assert!(!registry.is_dirty(1));
    }

    #[test]
    fn flush_all_clears_successfully_flushed_nodes() {
        let registry = DirtyRegistry::new();
        registry.mark(1);
        registry.mark(2);
        let report = registry.flush_all(Duration::from_secs(5), |_| Ok(()));
        assert_eq!(report.flushed.len(), 2);
        assert!(report.failed.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn flush_all_reports_failures_and_keeps_node_dirty() {
        let registry = DirtyRegistry::new();
        registry.mark(1);
        let report = registry.flush_all(Duration::from_secs(5), |_| Err("boom".to_string()));
        assert_eq!(report.failed.len(), 1);
        assert!(registry.is_dirty(1));
    }

    #[test]
    fn flush_all_respects_deadline() {
        let registry = DirtyRegistry::new();
        registry.mark(1);
        registry.mark(2);
        let report = registry.flush_all(Duration::from_secs(0), |_| Ok(()));
        assert_eq!(report.timed_out.len(), 2);
        assert!(report.flushed.is_empty());
    }
}
