//! Metrics registry
//!
//! - Counters only, monotonic
//! - Thread-safe, lock-free
//! - One registry can be shared by writers, cursors and compactors

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// # Thread Safety
///
/// All counters are atomics with Relaxed ordering; readers may observe
/// increments from concurrent tasks in any order.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    pages_loaded: AtomicU64,
    pages_pruned: AtomicU64,
    tasks_planned: AtomicU64,
    tasks_scanned: AtomicU64,
    rows_emitted: AtomicU64,
    leaves_written: AtomicU64,
    oversized_leaves: AtomicU64,
    compactions: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_pages_loaded(&self) {
        self.pages_loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_pages_pruned(&self) {
        self.pages_pruned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_tasks_planned(&self, tasks: u64) {
        self.tasks_planned.fetch_add(tasks, Ordering::Relaxed);
    }

    pub fn increment_tasks_scanned(&self) {
        self.tasks_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_rows_emitted(&self, rows: u64) {
        self.rows_emitted.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn increment_leaves_written(&self) {
        self.leaves_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_oversized_leaves(&self) {
        self.oversized_leaves.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_compactions(&self) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pages_loaded: self.pages_loaded.load(Ordering::Relaxed),
            pages_pruned: self.pages_pruned.load(Ordering::Relaxed),
            tasks_planned: self.tasks_planned.load(Ordering::Relaxed),
            tasks_scanned: self.tasks_scanned.load(Ordering::Relaxed),
            rows_emitted: self.rows_emitted.load(Ordering::Relaxed),
            leaves_written: self.leaves_written.load(Ordering::Relaxed),
            oversized_leaves: self.oversized_leaves.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of every counter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub pages_loaded: u64,
    pub pages_pruned: u64,
    pub tasks_planned: u64,
    pub tasks_scanned: u64,
    pub rows_emitted: u64,
    pub leaves_written: u64,
    pub oversized_leaves: u64,
    pub compactions: u64,
}

impl MetricsSnapshot {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increment_counters() {
        let registry = MetricsRegistry::new();
        registry.increment_pages_loaded();
        registry.increment_pages_loaded();
        registry.increment_pages_pruned();
        registry.add_tasks_planned(4);
        registry.add_rows_emitted(10);
        registry.increment_oversized_leaves();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.pages_loaded, 2);
        assert_eq!(snapshot.pages_pruned, 1);
        assert_eq!(snapshot.tasks_planned, 4);
        assert_eq!(snapshot.rows_emitted, 10);
        assert_eq!(snapshot.oversized_leaves, 1);
        assert_eq!(snapshot.compactions, 0);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.add_rows_emitted(1234);

        let parsed: serde_json::Value =
            serde_json::from_str(&registry.snapshot().to_json()).unwrap();
        assert_eq!(parsed["rows_emitted"], 1234);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..100 {
                        reg.increment_tasks_scanned();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.snapshot().tasks_scanned, 800);
    }
}
