//! Track record: the persisted progress state for one scope
//!
//! A scope is one level of the tracking hierarchy (cluster, keyspace,
//! table, or fragment). Records are serialized flat to the progress store
//! and restored on restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Progress state of one scope.
///
/// Invariant: `completed` is true iff `count >= total` and `total > 0`.
/// A record is "new" iff it has never been started.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub completed: bool,
    pub count: u32,
    pub total: u32,
    pub errors: u32,
    pub percent: f32,
    #[serde(default)]
    pub duration: Duration,
    #[serde(default)]
    pub average: Duration,
    #[serde(default)]
    pub estimate: Duration,
    #[serde(default)]
    pub rate: Duration,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
}

impl Track {
    /// Never started
    pub fn is_new(&self) -> bool {
        self.started.is_none()
    }

    /// Still running: started but not yet completed
    pub fn is_running(&self) -> bool {
        self.started.is_some() && !self.completed
    }

    /// Finished longer ago than `threshold`, therefore due again
    pub fn is_spoiled(&self, threshold: Duration) -> bool {
        match self.finished {
            Some(finished) => {
                let age = Utc::now().signed_duration_since(finished);
                age.to_std().map(|age| age > threshold).unwrap_or(false)
            }
            None => false,
        }
    }

    /// Completed recently enough to skip
    pub fn is_repaired(&self, threshold: Duration) -> bool {
        self.completed && !self.is_spoiled(threshold)
    }

    /// Begin tracking `total` units.
    ///
    /// A scope that is already running is left untouched: resetting an
    /// in-flight scope would lose progress mid-pass.
    pub fn start(&mut self, total: u32) {
        if self.is_running() {
            return;
        }
        self.started = Some(Utc::now());
        self.count = 0;
        self.errors = 0;
        self.total = total;
        self.completed = false;
        self.recompute();
    }

    /// Record one finished unit, accumulating its duration
    pub fn complete(&mut self, duration: Duration, failed: bool) {
        self.count += 1;
        if failed {
            self.errors += 1;
        }
        self.duration += duration;
        self.recompute();
        self.check_completion();
    }

    /// Record one bypassed unit without touching the cumulative duration
    pub fn skip(&mut self) {
        self.count += 1;
        self.percent = self.compute_percent();
        self.check_completion();
    }

    /// Clear completion and counts, preserving the declared total.
    /// Used when a failure requires redoing a unit.
    pub fn restart(&mut self) {
        self.count = 0;
        self.errors = 0;
        self.completed = false;
        self.recompute();
    }

    fn check_completion(&mut self) {
        if self.percent >= 100.0 && !self.completed {
            self.completed = true;
            self.finished = Some(Utc::now());
        }
    }

    fn recompute(&mut self) {
        self.percent = self.compute_percent();
        self.average = if self.count > 0 {
            self.duration / self.count
        } else {
            Duration::ZERO
        };
        self.estimate = self.average * self.total.saturating_sub(self.count);
    }

    fn compute_percent(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * self.count as f32 / self.total as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_new_record() {
        let t = Track::default();
        assert!(t.is_new());
        assert!(!t.is_running());
        assert!(!t.is_repaired(secs(3600)));
        assert_eq!(t.percent, 0.0);
    }

    #[test]
    fn test_percent_monotonic_and_completion_at_last_unit() {
        let mut t = Track::default();
        t.start(5);

        let expected = [20.0f32, 40.0, 60.0, 80.0, 100.0];
        for (i, want) in expected.iter().enumerate() {
            assert!(!t.completed, "completed early at unit {}", i);
            t.complete(secs(2), false);
            assert_eq!(t.percent, *want);
        }
        assert!(t.completed);
        assert!(t.finished.is_some());
        assert_eq!(t.average, secs(2));
    }

    #[test]
    fn test_zero_total_percent_guard() {
        let mut t = Track::default();
        t.start(0);
        assert_eq!(t.percent, 0.0);
        assert!(!t.completed);
    }

    #[test]
    fn test_skip_leaves_duration_untouched() {
        let mut t = Track::default();
        t.start(4);
        t.complete(secs(8), false);
        let avg = t.average;

        t.skip();
        assert_eq!(t.count, 2);
        assert_eq!(t.percent, 50.0);
        assert_eq!(t.duration, secs(8));
        assert_eq!(t.average, avg);
    }

    #[test]
    fn test_estimate() {
        let mut t = Track::default();
        t.start(4);
        t.complete(secs(10), false);
        assert_eq!(t.average, secs(10));
        assert_eq!(t.estimate, secs(30));
    }

    #[test]
    fn test_start_is_noop_while_running() {
        let mut t = Track::default();
        t.start(5);
        t.complete(secs(1), false);
        t.complete(secs(1), false);

        t.start(5);
        assert_eq!(t.count, 2, "restarting an in-flight scope lost progress");
    }

    #[test]
    fn test_start_resets_after_completion() {
        let mut t = Track::default();
        t.start(1);
        t.complete(secs(1), false);
        assert!(t.completed);

        t.start(3);
        assert!(!t.completed);
        assert_eq!(t.count, 0);
        assert_eq!(t.total, 3);
    }

    #[test]
    fn test_spoiled_by_age() {
        let mut t = Track::default();
        t.start(1);
        t.complete(secs(1), false);
        assert!(t.completed);

        // fresh: within threshold
        assert!(t.is_repaired(secs(3600)));

        // backdate the finish beyond the threshold
        t.finished = Some(Utc::now() - chrono::Duration::hours(2));
        assert!(t.is_spoiled(secs(3600)));
        assert!(!t.is_repaired(secs(3600)));
    }

    #[test]
    fn test_restart_clears_completion_regardless_of_freshness() {
        let mut t = Track::default();
        t.start(1);
        t.complete(secs(1), false);
        assert!(t.is_repaired(secs(u64::MAX)));

        t.restart();
        assert!(!t.completed);
        assert_eq!(t.count, 0);
        assert_eq!(t.total, 1);
        assert!(!t.is_repaired(secs(u64::MAX)));
    }

    #[test]
    fn test_errors_counted_on_failed_completion() {
        let mut t = Track::default();
        t.start(2);
        t.complete(secs(1), true);
        t.complete(secs(1), false);
        assert_eq!(t.errors, 1);
        assert!(t.completed);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut t = Track::default();
        t.start(3);
        t.complete(secs(5), false);

        let bytes = serde_json::to_vec(&t).unwrap();
        let back: Track = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, t);
    }
}
