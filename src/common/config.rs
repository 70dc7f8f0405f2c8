//! Configuration for the ringmend daemon
//!
//! Loaded from a TOML file, overridable through `RINGMEND_`-prefixed
//! environment variables; CLI flags take priority over both (merged in the
//! binary).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::common::utils;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bind address for the status receiver (host:port)
    #[serde(default = "default_callback")]
    pub callback: String,

    /// Worker pool size; also bounds the outbound job channel
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Regulator window capacity (recent durations per cluster)
    #[serde(default = "default_buffer")]
    pub buffer: usize,

    /// Regulator rate for clusters with no observations yet
    #[serde(default = "default_rate")]
    pub default_rate: String,

    /// Re-repair threshold: a fragment finished longer ago than this is due again
    #[serde(default = "default_repair_interval")]
    pub repair_interval: String,

    /// Cap on ERROR-status re-enqueues per job
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Sled directory for persisted progress
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Clusters to repair
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
}

/// One cluster's repair schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: String,

    /// Repair service host (topology source + executor)
    pub host: String,

    /// Repair service port
    pub port: u16,

    /// Sleep between full passes, e.g. "168h"
    #[serde(default = "default_interval")]
    pub interval: String,

    #[serde(default)]
    pub keyspaces: Vec<KeyspaceConfig>,
}

/// Keyspace repair schedule description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyspaceConfig {
    pub name: String,

    /// Default fragment count per token for this keyspace
    #[serde(default = "default_slices")]
    pub slices: u64,

    /// Per-table slice overrides
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

/// Per-table override of the keyspace slice count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    pub slices: u64,
}

fn default_callback() -> String {
    "127.0.0.1:8888".to_string()
}
fn default_workers() -> usize {
    4
}
fn default_buffer() -> usize {
    10
}
fn default_rate() -> String {
    "1s".to_string()
}
fn default_repair_interval() -> String {
    "168h".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_db_path() -> PathBuf {
    PathBuf::from("./ringmend-data")
}
fn default_interval() -> String {
    "168h".to_string()
}
fn default_slices() -> u64 {
    100
}

impl Config {
    /// Load configuration from a TOML file plus environment overrides
    pub fn load(path: &std::path::Path) -> crate::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("RINGMEND").separator("__"))
            .build()
            .map_err(|e| crate::Error::InvalidConfig(e.to_string()))?;

        let cfg: Config = settings
            .try_deserialize()
            .map_err(|e| crate::Error::InvalidConfig(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.workers == 0 {
            return Err(crate::Error::InvalidConfig("workers must be > 0".into()));
        }
        if self.buffer == 0 {
            return Err(crate::Error::InvalidConfig("buffer must be > 0".into()));
        }
        for cluster in &self.clusters {
            for ks in &cluster.keyspaces {
                if ks.slices == 0 {
                    return Err(crate::Error::InvalidConfig(format!(
                        "keyspace {}/{} has zero slices",
                        cluster.name, ks.name
                    )));
                }
                for t in &ks.tables {
                    if t.slices == 0 {
                        return Err(crate::Error::InvalidConfig(format!(
                            "table {}/{}/{} has zero slices",
                            cluster.name, ks.name, t.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Parsed re-repair threshold
    pub fn repair_threshold(&self) -> Duration {
        utils::parse_duration_or(&self.repair_interval, utils::WEEK)
    }

    /// Parsed regulator default rate
    pub fn regulator_default_rate(&self) -> Duration {
        utils::parse_duration_or(&self.default_rate, Duration::from_secs(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            callback: default_callback(),
            workers: default_workers(),
            buffer: default_buffer(),
            default_rate: default_rate(),
            repair_interval: default_repair_interval(),
            max_retries: default_max_retries(),
            db_path: default_db_path(),
            clusters: Vec::new(),
        }
    }
}

impl KeyspaceConfig {
    /// Slice count for a table, honoring per-table overrides
    pub fn slices_for(&self, table: &str) -> u64 {
        self.tables
            .iter()
            .find(|t| t.name == table)
            .map(|t| t.slices)
            .unwrap_or(self.slices)
    }
}

impl ClusterConfig {
    /// Inter-pass sleep, defaulting to a week on parse failure
    pub fn pass_interval(&self) -> Duration {
        utils::parse_duration_or(&self.interval, utils::WEEK)
    }
}
