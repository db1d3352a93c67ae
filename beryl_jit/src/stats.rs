//! Coordinator statistics.
//!
//! All counters are atomic so the worker, the mutator and tests can
//! bump and read them without the engine lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for the JIT coordination plane.
#[derive(Debug, Default)]
pub struct JitStats {
    submissions: AtomicU64,
    compiled: AtomicU64,
    compile_failures: AtomicU64,
    evictions: AtomicU64,
    swept: AtomicU64,
    wait_timeouts: AtomicU64,
    compactions: AtomicU64,
}

impl JitStats {
    /// Create zeroed stats.
    pub fn new() -> Self {
        JitStats::default()
    }

    /// Record one iseq admission.
    #[inline]
    pub fn record_submission(&self) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one successful compile-and-load.
    #[inline]
    pub fn record_compiled(&self) {
        self.compiled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one failed compile.
    #[inline]
    pub fn record_compile_failure(&self) {
        self.compile_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one capacity eviction.
    #[inline]
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one unit swept because its iseq was reclaimed.
    #[inline]
    pub fn record_swept(&self) {
        self.swept.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one synchronous wait that gave up.
    #[inline]
    pub fn record_wait_timeout(&self) {
        self.wait_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one shutdown compaction.
    #[inline]
    pub fn record_compaction(&self) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent-enough snapshot of all counters.
    pub fn snapshot(&self) -> JitStatsSnapshot {
        JitStatsSnapshot {
            submissions: self.submissions.load(Ordering::Relaxed),
            compiled: self.compiled.load(Ordering::Relaxed),
            compile_failures: self.compile_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
            wait_timeouts: self.wait_timeouts.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`JitStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JitStatsSnapshot {
    /// Iseqs admitted to the queue.
    pub submissions: u64,
    /// Units compiled and loaded.
    pub compiled: u64,
    /// Units whose compile failed.
    pub compile_failures: u64,
    /// Units evicted for cache capacity.
    pub evictions: u64,
    /// Units dropped because their iseq was reclaimed.
    pub swept: u64,
    /// Synchronous waits that timed out.
    pub wait_timeouts: u64,
    /// Shutdown compactions performed.
    pub compactions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = JitStats::new();
        stats.record_submission();
        stats.record_submission();
        stats.record_compiled();
        stats.record_eviction();

        let snap = stats.snapshot();
        assert_eq!(snap.submissions, 2);
        assert_eq!(snap.compiled, 1);
        assert_eq!(snap.evictions, 1);
        assert_eq!(snap.compile_failures, 0);
    }
}
