//! Hierarchical progress tracker
//!
//! Maintains one `Track` record per scope (cluster, keyspace, table,
//! fragment) in the progress store, keyed by an explicit composite key.
//! Every mutation is written through to the store before the call returns,
//! so a restarted process resumes from the last fully-completed state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::error::{Error, Result};
use crate::common::store::ProgressStore;
use crate::track::Track;

/// Store scope holding all track records
const SCOPE: &str = "repairs";

/// Composite key addressing one scope of the tracking hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackKey {
    pub cluster: String,
    pub keyspace: Option<String>,
    pub table: Option<String>,
    pub fragment: Option<u32>,
}

impl TrackKey {
    pub fn cluster(cluster: &str) -> Self {
        Self {
            cluster: cluster.to_string(),
            keyspace: None,
            table: None,
            fragment: None,
        }
    }

    pub fn keyspace(cluster: &str, keyspace: &str) -> Self {
        Self {
            keyspace: Some(keyspace.to_string()),
            ..Self::cluster(cluster)
        }
    }

    pub fn table(cluster: &str, keyspace: &str, table: &str) -> Self {
        Self {
            table: Some(table.to_string()),
            ..Self::keyspace(cluster, keyspace)
        }
    }

    pub fn fragment(cluster: &str, keyspace: &str, table: &str, id: u32) -> Self {
        Self {
            fragment: Some(id),
            ..Self::table(cluster, keyspace, table)
        }
    }

    /// Stable storage key
    fn render(&self) -> String {
        let mut parts = vec![self.cluster.clone()];
        if let Some(ks) = &self.keyspace {
            parts.push(ks.clone());
        }
        if let Some(t) = &self.table {
            parts.push(t.clone());
        }
        if let Some(id) = self.fragment {
            parts.push(id.to_string());
        }
        parts.join("/")
    }
}

impl std::fmt::Display for TrackKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Flattened statistics snapshot across all four scopes of one completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairStats {
    pub cluster: String,
    pub keyspace: String,
    pub table: String,
    pub id: u32,
    pub duration: Duration,
    pub rate: Duration,
    pub table_total: u32,
    pub table_completed: u32,
    pub table_errors: u32,
    pub table_percent: f32,
    pub table_average: Duration,
    pub table_estimate: Duration,
    pub keyspace_total: u32,
    pub keyspace_completed: u32,
    pub keyspace_errors: u32,
    pub keyspace_percent: f32,
    pub keyspace_average: Duration,
    pub keyspace_estimate: Duration,
    pub cluster_total: u32,
    pub cluster_completed: u32,
    pub cluster_errors: u32,
    pub cluster_percent: f32,
    pub cluster_average: Duration,
    pub cluster_estimate: Duration,
    pub last_cluster_success: Option<DateTime<Utc>>,
}

/// Progress tracker over a persistent store
///
/// Aggregate scopes are shared between concurrent completions, so every
/// mutation holds `mutate` across its read-modify-write cycle; the store
/// only serializes individual writes.
pub struct Tracker {
    store: Arc<dyn ProgressStore>,
    mutate: Mutex<()>,
}

impl Tracker {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self {
            store,
            mutate: Mutex::new(()),
        }
    }

    pub fn start_cluster(&self, cluster: &str, total: u32) -> Result<()> {
        self.start(&TrackKey::cluster(cluster), total)
    }

    pub fn start_keyspace(&self, cluster: &str, keyspace: &str, total: u32) -> Result<()> {
        self.start(&TrackKey::keyspace(cluster, keyspace), total)
    }

    pub fn start_table(&self, cluster: &str, keyspace: &str, table: &str, total: u32) -> Result<()> {
        self.start(&TrackKey::table(cluster, keyspace, table), total)
    }

    pub fn start_fragment(&self, cluster: &str, keyspace: &str, table: &str, id: u32) -> Result<()> {
        self.start(&TrackKey::fragment(cluster, keyspace, table, id), 1)
    }

    /// Is this fragment completed recently enough to skip?
    pub fn is_completed(
        &self,
        cluster: &str,
        keyspace: &str,
        table: &str,
        id: u32,
        threshold: Duration,
    ) -> Result<bool> {
        let track = self.read_track(&TrackKey::fragment(cluster, keyspace, table, id))?;
        Ok(track.is_repaired(threshold))
    }

    /// Record a fragment completion and cascade its duration up the
    /// hierarchy, returning the flattened four-scope snapshot.
    ///
    /// `rate` is the regulator's current moving average, persisted with each
    /// record for reporting.
    #[allow(clippy::too_many_arguments)]
    pub fn complete(
        &self,
        cluster: &str,
        keyspace: &str,
        table: &str,
        id: u32,
        duration: Duration,
        rate: Duration,
        failed: bool,
    ) -> Result<RepairStats> {
        let _guard = self.mutate.lock().unwrap();

        let fragment_key = TrackKey::fragment(cluster, keyspace, table, id);
        let mut fragment = self.read_track(&fragment_key)?;
        fragment.complete(duration, failed);
        fragment.rate = rate;
        self.write_track(&fragment_key, &fragment)?;

        let table_key = TrackKey::table(cluster, keyspace, table);
        let mut table_track = self.read_track(&table_key)?;
        table_track.complete(duration, failed);
        table_track.rate = rate;
        self.write_track(&table_key, &table_track)?;

        let keyspace_key = TrackKey::keyspace(cluster, keyspace);
        let mut keyspace_track = self.read_track(&keyspace_key)?;
        keyspace_track.complete(duration, failed);
        keyspace_track.rate = rate;
        self.write_track(&keyspace_key, &keyspace_track)?;

        let cluster_key = TrackKey::cluster(cluster);
        let mut cluster_track = self.read_track(&cluster_key)?;
        cluster_track.complete(duration, failed);
        cluster_track.rate = rate;
        self.write_track(&cluster_key, &cluster_track)?;

        Ok(RepairStats {
            cluster: cluster.to_string(),
            keyspace: keyspace.to_string(),
            table: table.to_string(),
            id,
            duration,
            rate,
            table_total: table_track.total,
            table_completed: table_track.count,
            table_errors: table_track.errors,
            table_percent: table_track.percent,
            table_average: table_track.average,
            table_estimate: table_track.estimate,
            keyspace_total: keyspace_track.total,
            keyspace_completed: keyspace_track.count,
            keyspace_errors: keyspace_track.errors,
            keyspace_percent: keyspace_track.percent,
            keyspace_average: keyspace_track.average,
            keyspace_estimate: keyspace_track.estimate,
            cluster_total: cluster_track.total,
            cluster_completed: cluster_track.count,
            cluster_errors: cluster_track.errors,
            cluster_percent: cluster_track.percent,
            cluster_average: cluster_track.average,
            cluster_estimate: cluster_track.estimate,
            last_cluster_success: cluster_track.finished,
        })
    }

    /// Count a bypassed fragment at all four scopes without duration
    pub fn skip(&self, cluster: &str, keyspace: &str, table: &str, id: u32) -> Result<()> {
        let _guard = self.mutate.lock().unwrap();
        for key in [
            TrackKey::fragment(cluster, keyspace, table, id),
            TrackKey::table(cluster, keyspace, table),
            TrackKey::keyspace(cluster, keyspace),
            TrackKey::cluster(cluster),
        ] {
            let mut track = self.read_track(&key)?;
            track.skip();
            self.write_track(&key, &track)?;
        }
        Ok(())
    }

    /// Reset a fragment record so a failed unit is redone
    pub fn restart(&self, cluster: &str, keyspace: &str, table: &str, id: u32) -> Result<()> {
        let _guard = self.mutate.lock().unwrap();
        let key = TrackKey::fragment(cluster, keyspace, table, id);
        let mut track = self.read_track(&key)?;
        track.restart();
        self.write_track(&key, &track)
    }

    /// Has the addressed scope recorded at least one error?
    pub fn has_errors(&self, key: &TrackKey) -> Result<bool> {
        Ok(self.read_track(key)?.errors > 0)
    }

    /// Read a scope's record for reporting
    pub fn progress(&self, key: &TrackKey) -> Result<Track> {
        self.read_track(key)
    }

    fn start(&self, key: &TrackKey, total: u32) -> Result<()> {
        let _guard = self.mutate.lock().unwrap();
        let mut track = self.read_track(key)?;
        track.start(total);
        self.write_track(key, &track)
    }

    fn read_track(&self, key: &TrackKey) -> Result<Track> {
        let rendered = key.render();
        match self.store.read_value(SCOPE, &rendered)? {
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| Error::CorruptedRecord {
                    scope: SCOPE.to_string(),
                    key: rendered,
                    reason: e.to_string(),
                })
            }
            None => Ok(Track::default()),
        }
    }

    fn write_track(&self, key: &TrackKey, track: &Track) -> Result<()> {
        let bytes = serde_json::to_vec(track)?;
        self.store.write_value(SCOPE, &key.render(), &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::store::MemStore;

    fn tracker() -> Tracker {
        Tracker::new(Arc::new(MemStore::new()))
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_key_rendering() {
        assert_eq!(TrackKey::cluster("c").render(), "c");
        assert_eq!(TrackKey::keyspace("c", "k").render(), "c/k");
        assert_eq!(TrackKey::table("c", "k", "t").render(), "c/k/t");
        assert_eq!(TrackKey::fragment("c", "k", "t", 7).render(), "c/k/t/7");
    }

    #[test]
    fn test_complete_cascades_to_all_scopes() {
        let t = tracker();
        t.start_cluster("c", 2).unwrap();
        t.start_keyspace("c", "k", 2).unwrap();
        t.start_table("c", "k", "t", 2).unwrap();
        t.start_fragment("c", "k", "t", 1).unwrap();

        let stats = t
            .complete("c", "k", "t", 1, secs(4), secs(4), false)
            .unwrap();
        assert_eq!(stats.table_completed, 1);
        assert_eq!(stats.table_percent, 50.0);
        assert_eq!(stats.keyspace_percent, 50.0);
        assert_eq!(stats.cluster_percent, 50.0);
        assert_eq!(stats.cluster_average, secs(4));
        assert_eq!(stats.cluster_estimate, secs(4));
        assert!(stats.last_cluster_success.is_none());

        t.start_fragment("c", "k", "t", 2).unwrap();
        let stats = t
            .complete("c", "k", "t", 2, secs(2), secs(3), false)
            .unwrap();
        assert_eq!(stats.cluster_percent, 100.0);
        assert!(stats.last_cluster_success.is_some());
    }

    #[test]
    fn test_concurrent_completions_lose_no_counts() {
        let t = Arc::new(tracker());
        let total = 32u32;
        t.start_cluster("c", total).unwrap();
        t.start_keyspace("c", "k", total).unwrap();
        t.start_table("c", "k", "t", total).unwrap();
        for id in 1..=total {
            t.start_fragment("c", "k", "t", id).unwrap();
        }

        // Distinct fragments of one table finishing together all update the
        // shared table/keyspace/cluster records.
        let handles: Vec<_> = (1..=total)
            .map(|id| {
                let t = t.clone();
                std::thread::spawn(move || {
                    t.complete("c", "k", "t", id, secs(1), secs(1), false).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for key in [
            TrackKey::table("c", "k", "t"),
            TrackKey::keyspace("c", "k"),
            TrackKey::cluster("c"),
        ] {
            let track = t.progress(&key).unwrap();
            assert_eq!(track.count, total, "lost completions at {}", key);
            assert_eq!(track.percent, 100.0);
            assert!(track.completed);
        }
    }

    #[test]
    fn test_stats_carry_per_scope_errors() {
        let t = tracker();
        t.start_cluster("c", 2).unwrap();
        t.start_keyspace("c", "k", 2).unwrap();
        t.start_table("c", "k", "t", 2).unwrap();
        t.start_fragment("c", "k", "t", 1).unwrap();

        let stats = t.complete("c", "k", "t", 1, secs(1), secs(1), true).unwrap();
        assert_eq!(stats.table_errors, 1);
        assert_eq!(stats.keyspace_errors, 1);
        assert_eq!(stats.cluster_errors, 1);

        t.start_fragment("c", "k", "t", 2).unwrap();
        let stats = t.complete("c", "k", "t", 2, secs(1), secs(1), false).unwrap();
        assert_eq!(stats.cluster_errors, 1);
    }

    #[test]
    fn test_is_completed_respects_threshold() {
        let t = tracker();
        t.start_fragment("c", "k", "t", 1).unwrap();
        t.complete("c", "k", "t", 1, secs(1), secs(1), false)
            .unwrap();

        assert!(t.is_completed("c", "k", "t", 1, secs(3600)).unwrap());
        // zero threshold: anything already finished is spoiled
        std::thread::sleep(Duration::from_millis(5));
        assert!(!t.is_completed("c", "k", "t", 1, Duration::ZERO).unwrap());
    }

    #[test]
    fn test_restart_after_failure() {
        let t = tracker();
        t.start_fragment("c", "k", "t", 1).unwrap();
        t.complete("c", "k", "t", 1, secs(1), secs(1), false)
            .unwrap();
        assert!(t.is_completed("c", "k", "t", 1, secs(u64::MAX)).unwrap());

        t.restart("c", "k", "t", 1).unwrap();
        assert!(!t.is_completed("c", "k", "t", 1, secs(u64::MAX)).unwrap());
    }

    #[test]
    fn test_skip_counts_without_duration() {
        let t = tracker();
        t.start_table("c", "k", "t", 2).unwrap();
        t.skip("c", "k", "t", 1).unwrap();

        let table = t.progress(&TrackKey::table("c", "k", "t")).unwrap();
        assert_eq!(table.count, 1);
        assert_eq!(table.percent, 50.0);
        assert_eq!(table.duration, Duration::ZERO);
        assert_eq!(table.average, Duration::ZERO);
    }

    #[test]
    fn test_has_errors() {
        let t = tracker();
        let key = TrackKey::table("c", "k", "t");
        assert!(!t.has_errors(&key).unwrap());

        t.start_table("c", "k", "t", 2).unwrap();
        t.complete("c", "k", "t", 1, secs(1), secs(1), true).unwrap();
        assert!(t.has_errors(&key).unwrap());
    }

    #[test]
    fn test_state_survives_reload() {
        let store: Arc<dyn ProgressStore> = Arc::new(MemStore::new());
        {
            let t = Tracker::new(store.clone());
            t.start_table("c", "k", "t", 3).unwrap();
            t.start_fragment("c", "k", "t", 1).unwrap();
            t.complete("c", "k", "t", 1, secs(2), secs(2), false)
                .unwrap();
        }
        // a "new process" over the same store sees the progress
        let t = Tracker::new(store);
        assert!(t.is_completed("c", "k", "t", 1, secs(3600)).unwrap());
        let table = t.progress(&TrackKey::table("c", "k", "t")).unwrap();
        assert_eq!(table.count, 1);
        assert_eq!(table.total, 3);
    }

    #[test]
    fn test_corrupted_record_is_surfaced() {
        let store = Arc::new(MemStore::new());
        store.write_value(SCOPE, "c/k/t/1", b"not json").unwrap();

        let t = Tracker::new(store);
        assert!(matches!(
            t.is_completed("c", "k", "t", 1, secs(1)),
            Err(Error::CorruptedRecord { .. })
        ));
    }
}
