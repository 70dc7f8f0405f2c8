//! Repair process metrics
//!
//! Lock-free counters exposed in Prometheus text format on the status
//! receiver's `/metrics` endpoint.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Counter for monotonically increasing values
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Gauge for values that move both ways
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// All metrics of the repair process
#[derive(Debug, Default)]
pub struct RepairMetrics {
    /// Fragments handed to the worker pool
    pub fragments_dispatched: Counter,
    /// Fragments acknowledged COMPLETE
    pub fragments_completed: Counter,
    /// Fragments skipped as fresh
    pub fragments_skipped: Counter,
    /// ERROR callbacks received
    pub repair_errors: Counter,
    /// Jobs dropped after exhausting retries
    pub retries_exhausted: Counter,
    /// Full passes finished across all clusters
    pub passes_completed: Counter,
    /// Jobs dispatched but not yet acknowledged
    pub jobs_in_flight: Gauge,
}

impl RepairMetrics {
    /// Render in Prometheus text exposition format
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(512);
        let counters = [
            ("ringmend_fragments_dispatched_total", &self.fragments_dispatched),
            ("ringmend_fragments_completed_total", &self.fragments_completed),
            ("ringmend_fragments_skipped_total", &self.fragments_skipped),
            ("ringmend_repair_errors_total", &self.repair_errors),
            ("ringmend_retries_exhausted_total", &self.retries_exhausted),
            ("ringmend_passes_completed_total", &self.passes_completed),
        ];
        for (name, c) in counters {
            out.push_str(&format!("# TYPE {} counter\n{} {}\n", name, name, c.get()));
        }
        out.push_str(&format!(
            "# TYPE ringmend_jobs_in_flight gauge\nringmend_jobs_in_flight {}\n",
            self.jobs_in_flight.get()
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_and_gauge() {
        let m = RepairMetrics::default();
        m.fragments_dispatched.inc();
        m.fragments_dispatched.add(2);
        m.jobs_in_flight.inc();
        m.jobs_in_flight.inc();
        m.jobs_in_flight.dec();

        assert_eq!(m.fragments_dispatched.get(), 3);
        assert_eq!(m.jobs_in_flight.get(), 1);
    }

    #[test]
    fn test_render_format() {
        let m = RepairMetrics::default();
        m.fragments_completed.inc();
        let text = m.render();
        assert!(text.contains("ringmend_fragments_completed_total 1"));
        assert!(text.contains("# TYPE ringmend_jobs_in_flight gauge"));
    }
}
