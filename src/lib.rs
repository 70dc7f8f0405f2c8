//! # ringmend
//!
//! Anti-entropy repair orchestrator for Cassandra-like clusters:
//! - splits each cluster's token ring into bounded fragments
//! - paces dispatch with a per-cluster moving-average rate regulator
//! - hands repair jobs to an external executor over HTTP
//! - tracks hierarchical progress (cluster → keyspace → table → fragment)
//!   in a persistent store, so interrupted runs resume without redoing
//!   completed work
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  per cluster   ┌───────────┐   bounded chan  ┌─────────┐
//! │ Scheduler  │───fragments───▶│  Tracker   │    ┌──────────▶│ Workers │
//! │ loop       │   due check    │ (persisted)│    │           └────┬────┘
//! └─────┬──────┘                └─────▲──────┘    │    POST /repair│
//!       │ throttle (Regulator)        │           │                ▼
//!       └────────── jobs ─────────────┼───────────┘      ┌────────────────┐
//!                                     │ COMPLETE/ERROR   │ repair service │
//!                          ┌──────────┴─────────┐◀───────│ (executor +    │
//!                          │ Status receiver    │ callback│  topology)    │
//!                          │ (axum, /status)    │        └────────────────┘
//!                          └────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! ringmend serve --config ringmend.toml
//! ```

pub mod client;
pub mod common;
pub mod regulator;
pub mod repair;
pub mod ring;
pub mod scheduler;
pub mod server;
pub mod track;
pub mod tracker;

// Re-export commonly used types
pub use client::RepairServiceClient;
pub use common::{Config, Error, Result};
pub use regulator::Regulator;
pub use repair::{RepairJob, RepairStatus, StatusKind};
pub use ring::{Fragment, Token};
pub use scheduler::{Navigation, Scheduler};
pub use track::Track;
pub use tracker::{RepairStats, TrackKey, Tracker};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
