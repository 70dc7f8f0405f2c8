//! Repair job wire types and the worker pool
//!
//! A `RepairJob` is a request to repair exactly one fragment of one table.
//! Workers drain the bounded job channel and hand each job to the cluster's
//! executor; the channel bound is the system's backpressure point.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::client::RepairServiceClient;
use crate::common::metrics::RepairMetrics;
use crate::ring::Fragment;

/// Status discriminator of an executor callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusKind {
    Complete,
    Error,
}

/// One fragment repair request, consumed once by the executor.
/// Re-created with its identity preserved when a failure is retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairJob {
    pub id: u32,
    pub cluster: String,
    pub keyspace: String,
    pub table: String,
    pub endpoint: String,
    pub start: i64,
    pub end: i64,
    pub callback: String,
    /// Delivery count, bumped on each ERROR re-enqueue
    #[serde(default)]
    pub attempt: u32,
}

impl RepairJob {
    pub fn from_fragment(fragment: &Fragment, table: &str, callback: &str) -> Self {
        Self {
            id: fragment.id,
            cluster: fragment.cluster.clone(),
            keyspace: fragment.keyspace.clone(),
            table: table.to_string(),
            endpoint: fragment.endpoint.clone(),
            start: fragment.start,
            end: fragment.end,
            callback: callback.to_string(),
            attempt: 0,
        }
    }
}

/// Asynchronous result notification, correlated by fragment identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairStatus {
    pub job: RepairJob,
    #[serde(rename = "type")]
    pub kind: StatusKind,
    #[serde(default)]
    pub message: String,
}

/// Spawn `count` workers draining the job channel.
///
/// Each job is routed to its cluster's executor client. A dispatch failure
/// is logged and the job dropped: the fragment stays started-not-completed,
/// so a later pass's freshness check re-attempts it.
pub fn spawn_workers(
    count: usize,
    jobs: mpsc::Receiver<RepairJob>,
    clients: Arc<HashMap<String, Arc<RepairServiceClient>>>,
    metrics: Arc<RepairMetrics>,
) -> Vec<JoinHandle<()>> {
    let jobs = Arc::new(Mutex::new(jobs));
    (1..=count)
        .map(|wid| {
            let jobs = jobs.clone();
            let clients = clients.clone();
            let metrics = metrics.clone();
            tokio::spawn(async move {
                tracing::info!(worker = wid, "Worker started");
                loop {
                    let job = {
                        let mut rx = jobs.lock().await;
                        rx.recv().await
                    };
                    let Some(job) = job else {
                        tracing::debug!(worker = wid, "Job channel closed, worker exiting");
                        break;
                    };

                    tracing::info!(
                        worker = wid,
                        cluster = %job.cluster,
                        keyspace = %job.keyspace,
                        table = %job.table,
                        id = job.id,
                        attempt = job.attempt,
                        "Starting repair job"
                    );

                    let Some(client) = clients.get(&job.cluster) else {
                        tracing::warn!(cluster = %job.cluster, id = job.id, "No executor for cluster");
                        metrics.jobs_in_flight.dec();
                        continue;
                    };

                    if let Err(e) = client.run_repair(&job).await {
                        tracing::warn!(
                            cluster = %job.cluster,
                            keyspace = %job.keyspace,
                            table = %job.table,
                            id = job.id,
                            error = %e,
                            "Fail to start job"
                        );
                        metrics.jobs_in_flight.dec();
                    }
                }
            })
        })
        .collect()
}
