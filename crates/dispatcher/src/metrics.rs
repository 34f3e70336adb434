//! Per-sink delivery counters
//!
//! Shared between a `SinkHandle` (enqueue side) and its worker (write side).

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct SinkMetrics {
    queue_depth: AtomicUsize,
    /// Events the sink accepted
    delivered: AtomicU64,
    /// Events the sink returned an error for
    failed: AtomicU64,
    /// Events refused at enqueue because the queue was full
    dropped: AtomicU64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_depth: self.queue_depth(),
            delivered: self.delivered(),
            failed: self.failed(),
            dropped: self.dropped(),
        }
    }
}

/// Point-in-time copy of `SinkMetrics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub queue_depth: usize,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl MetricsSnapshot {
    /// Every event offered to the sink, whatever became of it
    pub fn offered(&self) -> u64 {
        self.delivered + self.failed + self.dropped
    }

    /// Share of offered events the sink accepted; 1.0 when nothing was offered
    pub fn delivery_ratio(&self) -> f64 {
        match self.offered() {
            0 => 1.0,
            n => self.delivered as f64 / n as f64,
        }
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delivered={} failed={} dropped={} ({:.1}% delivered)",
            self.delivered,
            self.failed,
            self.dropped,
            self.delivery_ratio() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_ratio() {
        let metrics = SinkMetrics::new();
        assert_eq!(metrics.snapshot().delivery_ratio(), 1.0);

        for _ in 0..3 {
            metrics.record_delivered();
        }
        metrics.record_dropped();
        metrics.set_queue_depth(2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.offered(), 4);
        assert_eq!(snapshot.queue_depth, 2);
        assert!((snapshot.delivery_ratio() - 0.75).abs() < 1e-12);
        assert!(snapshot.to_string().contains("75.0% delivered"));
    }
}
