//! Explicit error metrics shared by the composer and delivery engine.
//!
//! Injected rather than global so a health-reporting collaborator can read
//! the counters and tests can assert exact increment counts.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    generation_failures: AtomicU64,
    delivery_failures: AtomicU64,
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub generation_failures: u64,
    pub delivery_failures: u64,
}

impl MetricsSnapshot {
    pub fn errors_total(&self) -> u64 {
        self.generation_failures + self.delivery_failures
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_generation_failure(&self) {
        self.generation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }

    /// Returns the counters and resets them, for periodic-window reporting.
    pub fn take_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            generation_failures: self.generation_failures.swap(0, Ordering::Relaxed),
            delivery_failures: self.delivery_failures.swap(0, Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PipelineMetrics;

    #[test]
    fn counters_accumulate_and_reset() {
        let metrics = PipelineMetrics::new();
        metrics.record_generation_failure();
        metrics.record_generation_failure();
        metrics.record_delivery_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.generation_failures, 2);
        assert_eq!(snapshot.delivery_failures, 1);
        assert_eq!(snapshot.errors_total(), 3);

        let taken = metrics.take_snapshot();
        assert_eq!(taken.errors_total(), 3);
        assert_eq!(metrics.snapshot().errors_total(), 0);
    }
}
