//! Adaptive rate regulator
//!
//! Fragment repair duration varies with data volume and cluster load. A
//! moving average over the last N observed durations approximates current
//! load without explicit feedback from the data store: after a fast
//! fragment dispatch continues quickly, after a slow one it self-throttles.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Fixed-capacity FIFO of recently observed durations
#[derive(Debug)]
pub struct DurationWindow {
    entries: VecDeque<Duration>,
    capacity: usize,
}

impl DurationWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push an observation, evicting the oldest once full
    pub fn push(&mut self, d: Duration) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(d);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Arithmetic mean of current entries; None when empty
    pub fn average(&self) -> Option<Duration> {
        if self.entries.is_empty() {
            return None;
        }
        let sum: Duration = self.entries.iter().sum();
        Some(sum / self.entries.len() as u32)
    }
}

/// Per-key sliding-window duration estimator, keyed by cluster name.
/// Windows for different keys are fully independent.
pub struct Regulator {
    windows: Mutex<HashMap<String, DurationWindow>>,
    capacity: usize,
    default_rate: Duration,
}

impl Regulator {
    /// `capacity` is the window ("buffer") length; `default_rate` is
    /// returned for keys with no observations yet.
    pub fn new(capacity: usize, default_rate: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            capacity,
            default_rate,
        }
    }

    /// Record an observed duration and return the new mean for the key
    pub fn observe(&self, key: &str, duration: Duration) -> Duration {
        let mut windows = self.windows.lock().unwrap();
        let window = windows
            .entry(key.to_string())
            .or_insert_with(|| DurationWindow::new(self.capacity));
        window.push(duration);
        let rate = window.average().unwrap_or(self.default_rate);
        tracing::debug!(key, ?duration, ?rate, "Duration observed");
        rate
    }

    /// Current mean for the key without mutating the window
    pub fn rate(&self, key: &str) -> Duration {
        let windows = self.windows.lock().unwrap();
        windows
            .get(key)
            .and_then(|w| w.average())
            .unwrap_or(self.default_rate)
    }

    /// Block the caller for the key's current rate
    pub async fn limit(&self, key: &str) {
        let rate = self.rate(key);
        tracing::debug!(key, ?rate, "Rate limited");
        tokio::time::sleep(rate).await;
    }
}
