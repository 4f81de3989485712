//! Approximate global counters (§9): vertex/edge totals and commit
//! throughput, tracked with relaxed atomics rather than exact per-shard
//! enumeration. Callers that need an exact count should derive it from a
//! read transaction by walking shards directly; these counters exist for
//! cheap, racy monitoring, not transactional correctness.

use crate::sync::{AtomicI64, AtomicU64, Ordering};

/// Engine-wide approximate counters.
#[derive(Default)]
pub struct Metrics {
    vertex_count: AtomicI64,
    edge_count: AtomicI64,
    write_commits: AtomicU64,
    light_write_commits: AtomicU64,
    read_txns_opened: AtomicU64,
    snapshots_opened: AtomicU64,
}

impl Metrics {
    /// A fresh, zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn vertex_count(&self) -> u64 {
        self.vertex_count.load(Ordering::Relaxed).max(0) as u64
    }

    #[must_use]
    pub fn edge_count(&self) -> u64 {
        self.edge_count.load(Ordering::Relaxed).max(0) as u64
    }

    #[must_use]
    pub fn write_commit_count(&self) -> u64 {
        self.write_commits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn light_write_commit_count(&self) -> u64 {
        self.light_write_commits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn read_txns_opened(&self) -> u64 {
        self.read_txns_opened.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshots_opened(&self) -> u64 {
        self.snapshots_opened.load(Ordering::Relaxed)
    }

    pub fn record_insert_vertex(&self) {
        self.vertex_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remove_vertex(&self) {
        self.vertex_count.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_insert_edge(&self) {
        self.edge_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Bulk form of `record_insert_edge`, for a batch insert that just
    /// landed `n` new edges in one merge.
    pub fn record_insert_edge_n(&self, n: usize) {
        if n > 0 {
            self.edge_count.fetch_add(n as i64, Ordering::Relaxed);
        }
    }

    pub fn record_remove_edge(&self) {
        self.edge_count.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_write_commit(&self) {
        self.write_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_light_write_commit(&self) {
        self.light_write_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_txn_opened(&self) {
        self.read_txns_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_opened(&self) {
        self.snapshots_opened.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let m = Metrics::new();
        assert_eq!(m.vertex_count(), 0);
        assert_eq!(m.edge_count(), 0);
    }

    #[test]
    fn insert_and_remove_adjust_counts() {
        let m = Metrics::new();
        m.record_insert_vertex();
        m.record_insert_vertex();
        m.record_remove_vertex();
        assert_eq!(m.vertex_count(), 1);
    }

    #[test]
    fn commit_counters_track_write_kinds() {
        let m = Metrics::new();
        m.record_write_commit();
        m.record_light_write_commit();
        m.record_light_write_commit();
        assert_eq!(m.write_commit_count(), 1);
        assert_eq!(m.light_write_commit_count(), 2);
    }
}
