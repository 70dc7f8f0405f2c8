//! Common utilities and types shared across ringmend

pub mod config;
pub mod error;
pub mod metrics;
pub mod store;
pub mod utils;

pub use config::{ClusterConfig, Config, KeyspaceConfig, TableConfig};
pub use error::{Error, Result};
pub use metrics::RepairMetrics;
pub use store::{MemStore, ProgressStore, SledStore};
pub use utils::{format_duration, parse_duration, parse_duration_or, WEEK};
