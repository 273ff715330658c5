use std::sync::atomic::{AtomicU64, Ordering};

/// Per-buffer counters. Updated with relaxed atomics only when the owning
/// channels were built with `enable_metrics`.
#[derive(Debug, Default)]
pub struct BufferMetrics {
    saved: AtomicU64,
    rejected: AtomicU64,
    overwritten: AtomicU64,
    drained: AtomicU64,
}

impl BufferMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_saved(&self) {
        self.saved.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_overwritten(&self) {
        self.overwritten.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_drained(&self, n: u64) {
        self.drained.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BufferMetricsSnapshot {
        BufferMetricsSnapshot {
            saved: self.saved.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            overwritten: self.overwritten.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`BufferMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferMetricsSnapshot {
    /// Items accepted by `save`
    pub saved: u64,
    /// Writes refused under `DropIfOccupied`
    pub rejected: u64,
    /// Undrained items displaced under `OverwriteAlways`
    pub overwritten: u64,
    /// Items handed to a drain
    pub drained: u64,
}

impl std::ops::AddAssign for BufferMetricsSnapshot {
    fn add_assign(&mut self, rhs: Self) {
        self.saved += rhs.saved;
        self.rejected += rhs.rejected;
        self.overwritten += rhs.overwritten;
        self.drained += rhs.drained;
    }
}

/// Consumer-side counters for one worker. Always on: only the worker thread
/// writes them and it is never on the producer path.
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    cycles: AtomicU64,
    idle_cycles: AtomicU64,
    batches: AtomicU64,
    items: AtomicU64,
    sink_errors: AtomicU64,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_cycle(&self, had_data: bool) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        if !had_data {
            self.idle_cycles.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_batch(&self, items: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.items.fetch_add(items as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_sink_error(&self) {
        self.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerMetricsSnapshot {
        WorkerMetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            idle_cycles: self.idle_cycles.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            items: self.items.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerMetricsSnapshot {
    pub cycles: u64,
    pub idle_cycles: u64,
    /// Non-empty batches handed to sinks, including ones that failed
    pub batches: u64,
    pub items: u64,
    pub sink_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_snapshot_sum() {
        let a = BufferMetrics::new();
        a.record_saved();
        a.record_saved();
        a.record_rejected();
        let b = BufferMetrics::new();
        b.record_overwritten();
        b.add_drained(3);

        let mut total = a.snapshot();
        total += b.snapshot();
        assert_eq!(
            total,
            BufferMetricsSnapshot { saved: 2, rejected: 1, overwritten: 1, drained: 3 }
        );
    }

    #[test]
    fn test_worker_idle_cycles() {
        let m = WorkerMetrics::new();
        m.record_cycle(true);
        m.record_cycle(false);
        m.record_cycle(false);
        m.record_batch(5);

        let s = m.snapshot();
        assert_eq!(s.cycles, 3);
        assert_eq!(s.idle_cycles, 2);
        assert_eq!(s.batches, 1);
        assert_eq!(s.items, 5);
    }
}
