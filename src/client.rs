//! HTTP client for the repair service
//!
//! One service per cluster plays two roles: topology source (ring and table
//! discovery) and repair executor (accepts repair jobs and later calls back
//! with a status payload).

use std::time::Duration;

use crate::common::error::{Error, Result};
use crate::repair::RepairJob;
use crate::ring::Token;

pub struct RepairServiceClient {
    base: String,
    http: reqwest::Client,
}

impl RepairServiceClient {
    pub fn new(host: &str, port: u16) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            base: format!("http://{}:{}", host, port),
            http,
        }
    }

    /// Table names of a keyspace
    pub async fn tables(&self, cluster: &str, keyspace: &str) -> Result<Vec<String>> {
        let url = format!("{}/tables/{}/{}", self.base, cluster, keyspace);
        tracing::debug!(%url, "Obtaining tables");

        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Topology(format!(
                "tables fetch for {}/{} returned {}",
                cluster,
                keyspace,
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    /// Current token ring of a keyspace.
    ///
    /// An empty ring is an error, never "nothing to repair".
    pub async fn ring(&self, cluster: &str, keyspace: &str) -> Result<Vec<Token>> {
        let url = format!("{}/ring/{}/{}", self.base, cluster, keyspace);
        tracing::debug!(%url, "Obtaining ring description");

        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Topology(format!(
                "ring fetch for {}/{} returned {}",
                cluster,
                keyspace,
                resp.status()
            )));
        }
        let tokens: Vec<Token> = resp.json().await?;
        if tokens.is_empty() {
            return Err(Error::EmptyRing {
                cluster: cluster.to_string(),
                keyspace: keyspace.to_string(),
            });
        }
        Ok(tokens)
    }

    /// Hand one repair job to the executor
    pub async fn run_repair(&self, job: &RepairJob) -> Result<()> {
        let url = format!("{}/repair", self.base);
        let resp = self.http.post(&url).json(job).send().await?;
        if !resp.status().is_success() {
            return Err(Error::ExecutorRejected {
                id: job.id,
                cluster: job.cluster.clone(),
                keyspace: job.keyspace.clone(),
                table: job.table.clone(),
                reason: resp.status().to_string(),
            });
        }
        Ok(())
    }
}
