//! Per-cluster scheduling loop
//!
//! Each cluster runs one forever-loop: obtain the current tables and ring,
//! decide per fragment whether it is still fresh, throttle through the
//! regulator, dispatch due fragments onto the bounded job channel, then
//! sleep for the cluster's interval before the next pass.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::client::RepairServiceClient;
use crate::common::config::{ClusterConfig, KeyspaceConfig};
use crate::common::metrics::RepairMetrics;
use crate::regulator::Regulator;
use crate::repair::RepairJob;
use crate::ring::{keyspace_fragments, Fragment};
use crate::tracker::Tracker;

/// Current position filter: scheduling is restricted to matching scopes.
/// Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigation {
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub keyspace: String,
    #[serde(default)]
    pub table: String,
}

impl Navigation {
    pub fn matches(&self, cluster: &str, keyspace: &str, table: &str) -> bool {
        (self.cluster.is_empty() || self.cluster == cluster)
            && (self.keyspace.is_empty() || self.keyspace == keyspace)
            && (self.table.is_empty() || self.table == table)
    }
}

/// One table's worth of fragments for a single pass
struct TablePlan {
    name: String,
    fragments: Vec<Fragment>,
}

/// One keyspace's worth of tables for a single pass
struct KeyspacePlan {
    name: String,
    tables: Vec<TablePlan>,
}

impl KeyspacePlan {
    fn total(&self) -> u32 {
        self.tables.iter().map(|t| t.fragments.len() as u32).sum()
    }
}

pub struct Scheduler {
    cluster: ClusterConfig,
    threshold: Duration,
    callback_url: String,
    client: Arc<RepairServiceClient>,
    tracker: Arc<Tracker>,
    regulator: Arc<Regulator>,
    jobs: mpsc::Sender<RepairJob>,
    navigation: Arc<RwLock<Navigation>>,
    metrics: Arc<RepairMetrics>,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cluster: ClusterConfig,
        threshold: Duration,
        callback_url: String,
        client: Arc<RepairServiceClient>,
        tracker: Arc<Tracker>,
        regulator: Arc<Regulator>,
        jobs: mpsc::Sender<RepairJob>,
        navigation: Arc<RwLock<Navigation>>,
        metrics: Arc<RepairMetrics>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            cluster,
            threshold,
            callback_url,
            client,
            tracker,
            regulator,
            jobs,
            navigation,
            metrics,
            shutdown,
        }
    }

    /// Run scheduling passes until shutdown
    pub async fn run(mut self) {
        let interval = self.cluster.pass_interval();
        loop {
            tracing::debug!(cluster = %self.cluster.name, "Starting cluster pass");
            self.run_pass().await;
            self.metrics.passes_completed.inc();

            tracing::debug!(
                cluster = %self.cluster.name,
                "Cluster scheduled. Going to sleep for: {:?}",
                interval
            );
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.shutdown.changed() => {}
            }
            if *self.shutdown.borrow() {
                tracing::info!(cluster = %self.cluster.name, "Scheduler stopping");
                return;
            }
        }
    }

    /// One full traversal of the cluster's keyspaces and tables
    async fn run_pass(&mut self) {
        // Obtain everything first so scope totals are known up front.
        let plans = self.obtain().await;
        let cluster_total: u32 = plans.iter().map(|k| k.total()).sum();

        let cluster = self.cluster.name.clone();
        if let Err(e) = self.tracker.start_cluster(&cluster, cluster_total) {
            tracing::error!(%cluster, error = %e, "Failed to persist cluster start");
            return;
        }

        for keyspace in plans {
            tracing::debug!(%cluster, keyspace = %keyspace.name, "Starting keyspace");
            if let Err(e) = self
                .tracker
                .start_keyspace(&cluster, &keyspace.name, keyspace.total())
            {
                tracing::error!(%cluster, keyspace = %keyspace.name, error = %e, "Failed to persist keyspace start");
                continue;
            }

            for table in &keyspace.tables {
                tracing::debug!(%cluster, keyspace = %keyspace.name, table = %table.name, "Starting table");
                if let Err(e) = self.tracker.start_table(
                    &cluster,
                    &keyspace.name,
                    &table.name,
                    table.fragments.len() as u32,
                ) {
                    tracing::error!(%cluster, keyspace = %keyspace.name, table = %table.name, error = %e, "Failed to persist table start");
                    continue;
                }

                for fragment in &table.fragments {
                    if *self.shutdown.borrow() {
                        return;
                    }
                    self.consider(&keyspace.name, table, fragment).await;
                }
            }
        }
    }

    /// Decide, throttle, and dispatch one fragment
    async fn consider(&self, keyspace: &str, table: &TablePlan, fragment: &Fragment) {
        let cluster = &self.cluster.name;

        {
            let nav = self.navigation.read().unwrap();
            if !nav.matches(cluster, keyspace, &table.name) {
                return;
            }
        }

        match self
            .tracker
            .is_completed(cluster, keyspace, &table.name, fragment.id, self.threshold)
        {
            Ok(true) => {
                tracing::debug!(%cluster, keyspace, table = %table.name, id = fragment.id, "Repair already completed");
                if let Err(e) = self.tracker.skip(cluster, keyspace, &table.name, fragment.id) {
                    tracing::warn!(%cluster, keyspace, table = %table.name, id = fragment.id, error = %e, "Failed to persist skip");
                }
                self.metrics.fragments_skipped.inc();
                return;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(%cluster, keyspace, table = %table.name, id = fragment.id, error = %e, "Freshness check failed, skipping fragment");
                return;
            }
        }

        self.regulator.limit(cluster).await;

        if let Err(e) = self
            .tracker
            .start_fragment(cluster, keyspace, &table.name, fragment.id)
        {
            tracing::warn!(%cluster, keyspace, table = %table.name, id = fragment.id, error = %e, "Failed to persist fragment start, skipping");
            return;
        }

        tracing::debug!(%cluster, keyspace, table = %table.name, id = fragment.id, "Scheduling fragment");
        let job = RepairJob::from_fragment(fragment, &table.name, &self.callback_url);
        // May block when the worker pool is saturated: intentional backpressure.
        if self.jobs.send(job).await.is_err() {
            tracing::error!(%cluster, "Job channel closed, abandoning pass");
            return;
        }
        self.metrics.fragments_dispatched.inc();
        self.metrics.jobs_in_flight.inc();
    }

    /// Obtain phase: fetch tables and ring per keyspace, subdivide into
    /// per-table fragment lists. Failures skip the keyspace or table for
    /// this pass only.
    async fn obtain(&self) -> Vec<KeyspacePlan> {
        let cluster = &self.cluster.name;
        let mut plans = Vec::with_capacity(self.cluster.keyspaces.len());

        for ks in &self.cluster.keyspaces {
            let tables = match self.client.tables(cluster, &ks.name).await {
                Ok(tables) => tables,
                Err(e) => {
                    tracing::warn!(%cluster, keyspace = %ks.name, error = %e, "Tables obtain error");
                    continue;
                }
            };
            let tokens = match self.client.ring(cluster, &ks.name).await {
                Ok(tokens) => tokens,
                Err(e) => {
                    tracing::warn!(%cluster, keyspace = %ks.name, error = %e, "Ring obtain error");
                    continue;
                }
            };

            let mut plan = KeyspacePlan {
                name: ks.name.clone(),
                tables: Vec::with_capacity(tables.len()),
            };
            for table in tables {
                match table_plan(cluster, ks, &table, &tokens) {
                    Ok(table_plan) => plan.tables.push(table_plan),
                    Err(e) => {
                        tracing::warn!(%cluster, keyspace = %ks.name, %table, error = %e, "Fragments obtain error");
                    }
                }
            }
            plans.push(plan);
        }
        plans
    }
}

fn table_plan(
    cluster: &str,
    ks: &KeyspaceConfig,
    table: &str,
    tokens: &[crate::ring::Token],
) -> crate::Result<TablePlan> {
    let slices = ks.slices_for(table);
    let fragments = keyspace_fragments(cluster, &ks.name, tokens, slices)?;
    Ok(TablePlan {
        name: table.to_string(),
        fragments,
    })
}
