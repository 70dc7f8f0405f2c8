//! ringmend daemon binary

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ringmend::common::{MemStore, ProgressStore, RepairMetrics, SledStore};
use ringmend::server::{create_router, ReceiverState};
use ringmend::{Config, Navigation, Regulator, RepairServiceClient, Scheduler, Tracker};

#[derive(Parser)]
#[command(name = "ringmend")]
#[command(about = "anti-entropy repair orchestrator", version = ringmend::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the repair scheduler and status receiver
    Serve {
        /// Configuration file
        #[arg(long, default_value = "ringmend.toml")]
        config: PathBuf,

        /// Bind address for the status receiver (overrides config)
        #[arg(long)]
        callback: Option<String>,

        /// Worker pool size (overrides config)
        #[arg(long)]
        workers: Option<usize>,

        /// Progress database directory (overrides config)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Keep progress in memory only (for trial runs)
        #[arg(long)]
        ephemeral: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            callback,
            workers,
            db,
            ephemeral,
        } => {
            let mut cfg = Config::load(&config)?;
            // CLI flags take priority over file and environment
            if let Some(callback) = callback {
                cfg.callback = callback;
            }
            if let Some(workers) = workers {
                cfg.workers = workers;
            }
            if let Some(db) = db {
                cfg.db_path = db;
            }
            cfg.validate()?;
            serve(cfg, ephemeral).await?;
        }
    }

    Ok(())
}

async fn serve(cfg: Config, ephemeral: bool) -> anyhow::Result<()> {
    tracing::info!("Starting ringmend {}", ringmend::VERSION);
    tracing::info!("  Status receiver: {}", cfg.callback);
    tracing::info!("  Workers: {}", cfg.workers);
    tracing::info!("  Clusters: {}", cfg.clusters.len());

    // Cannot-open-store is the one fatal startup error.
    let store: Arc<dyn ProgressStore> = if ephemeral {
        tracing::warn!("Running with in-memory progress store, state will not survive restart");
        Arc::new(MemStore::new())
    } else {
        tracing::info!("  DB path: {}", cfg.db_path.display());
        Arc::new(SledStore::open(&cfg.db_path)?)
    };

    let tracker = Arc::new(Tracker::new(store));
    let regulator = Arc::new(Regulator::new(cfg.buffer, cfg.regulator_default_rate()));
    let metrics = Arc::new(RepairMetrics::default());
    let navigation = Arc::new(RwLock::new(Navigation::default()));
    let (jobs_tx, jobs_rx) = mpsc::channel(cfg.workers);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let clients: HashMap<String, Arc<RepairServiceClient>> = cfg
        .clusters
        .iter()
        .map(|c| {
            (
                c.name.clone(),
                Arc::new(RepairServiceClient::new(&c.host, c.port)),
            )
        })
        .collect();
    let clients = Arc::new(clients);

    let worker_handles =
        ringmend::repair::spawn_workers(cfg.workers, jobs_rx, clients.clone(), metrics.clone());

    let callback_url = format!("http://{}/status", cfg.callback);
    let threshold = cfg.repair_threshold();
    let mut scheduler_handles = Vec::new();
    for cluster in cfg.clusters.clone() {
        let client = clients
            .get(&cluster.name)
            .expect("client built per cluster")
            .clone();
        let scheduler = Scheduler::new(
            cluster,
            threshold,
            callback_url.clone(),
            client,
            tracker.clone(),
            regulator.clone(),
            jobs_tx.clone(),
            navigation.clone(),
            metrics.clone(),
            shutdown_rx.clone(),
        );
        scheduler_handles.push(tokio::spawn(scheduler.run()));
    }
    // The receiver keeps its own sender for failure re-enqueue; workers exit
    // once the schedulers and the receiver are both gone.
    let state = ReceiverState {
        tracker,
        regulator,
        jobs: jobs_tx,
        navigation,
        metrics,
        max_retries: cfg.max_retries,
    };

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(&cfg.callback).await?;
    tracing::info!("Server listen at {}", cfg.callback);

    let mut server_shutdown = shutdown_rx.clone();
    let server = async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await
    };

    tokio::select! {
        res = server => {
            if let Err(e) = res {
                tracing::error!("Receiver error: {}", e);
            }
            // Schedulers wait on the same watch channel; without this they
            // would sleep out their pass intervals while we await them.
            let _ = shutdown_tx.send(true);
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, draining");
            let _ = shutdown_tx.send(true);
        }
    }

    for handle in scheduler_handles {
        let _ = handle.await;
    }
    for handle in worker_handles {
        handle.abort();
    }
    tracing::info!("ringmend stopped");
    Ok(())
}
