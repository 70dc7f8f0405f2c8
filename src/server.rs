//! Status receiver
//!
//! An always-listening axum endpoint accepting asynchronous COMPLETE/ERROR
//! notifications from the repair executor, correlated by fragment identity.
//! Completions feed the tracker and the regulator; failures reset the
//! fragment and re-enqueue its job up to the configured retry cap.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::common::metrics::RepairMetrics;
use crate::common::utils::format_duration;
use crate::regulator::Regulator;
use crate::repair::{RepairJob, RepairStatus, StatusKind};
use crate::scheduler::Navigation;
use crate::tracker::{TrackKey, Tracker};

#[derive(Clone)]
pub struct ReceiverState {
    pub tracker: Arc<Tracker>,
    pub regulator: Arc<Regulator>,
    pub jobs: mpsc::Sender<RepairJob>,
    pub navigation: Arc<RwLock<Navigation>>,
    pub metrics: Arc<RepairMetrics>,
    pub max_retries: u32,
}

pub fn create_router(state: ReceiverState) -> Router {
    Router::new()
        .route("/status", post(handle_status))
        .route("/nav", post(handle_nav))
        .route("/progress/:cluster", get(handle_progress))
        .route("/metrics", get(handle_metrics))
        .route("/health", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Accept a callback payload. Malformed bodies are logged and dropped;
/// acknowledging receipt is the only response contract.
async fn handle_status(State(state): State<ReceiverState>, body: Bytes) -> impl IntoResponse {
    let status: RepairStatus = match serde_json::from_slice(&body) {
        Ok(status) => status,
        Err(e) => {
            tracing::warn!(
                error = %e,
                body = %String::from_utf8_lossy(&body),
                "Invalid status received"
            );
            return StatusCode::OK;
        }
    };

    match status.kind {
        StatusKind::Complete => process_complete(&state, status).await,
        StatusKind::Error => process_fail(&state, status).await,
    }
}

async fn process_complete(state: &ReceiverState, status: RepairStatus) -> StatusCode {
    let job = &status.job;
    state.metrics.jobs_in_flight.dec();

    // The fragment's duration is the time since its Start was persisted.
    let key = TrackKey::fragment(&job.cluster, &job.keyspace, &job.table, job.id);
    let duration = match state.tracker.progress(&key) {
        Ok(track) => track
            .started
            .map(|started| {
                chrono::Utc::now()
                    .signed_duration_since(started)
                    .to_std()
                    .unwrap_or(Duration::ZERO)
            })
            .unwrap_or(Duration::ZERO),
        Err(e) => {
            tracing::error!(%key, error = %e, "Failed to read fragment record");
            return e.to_http_status();
        }
    };

    let rate = state.regulator.observe(&job.cluster, duration);

    match state.tracker.complete(
        &job.cluster,
        &job.keyspace,
        &job.table,
        job.id,
        duration,
        rate,
        false,
    ) {
        Ok(stats) => {
            state.metrics.fragments_completed.inc();
            tracing::info!(
                cluster = %stats.cluster,
                keyspace = %stats.keyspace,
                table = %stats.table,
                id = stats.id,
                duration = %format_duration(stats.duration),
                rate = ?stats.rate,
                table_percent = stats.table_percent,
                keyspace_percent = stats.keyspace_percent,
                cluster_percent = stats.cluster_percent,
                cluster_estimate = %format_duration(stats.cluster_estimate),
                "Fragment completed"
            );
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(%key, error = %e, "Failed to persist completion");
            e.to_http_status()
        }
    }
}

async fn process_fail(state: &ReceiverState, status: RepairStatus) -> StatusCode {
    let mut job = status.job;
    state.metrics.jobs_in_flight.dec();
    state.metrics.repair_errors.inc();
    tracing::warn!(
        cluster = %job.cluster,
        keyspace = %job.keyspace,
        table = %job.table,
        id = job.id,
        attempt = job.attempt,
        message = %status.message,
        "Repair error received"
    );

    if let Err(e) = state
        .tracker
        .restart(&job.cluster, &job.keyspace, &job.table, job.id)
    {
        tracing::error!(
            cluster = %job.cluster,
            keyspace = %job.keyspace,
            table = %job.table,
            id = job.id,
            error = %e,
            "Failed to reset fragment record"
        );
        return e.to_http_status();
    }

    if job.attempt >= state.max_retries {
        state.metrics.retries_exhausted.inc();
        tracing::error!(
            cluster = %job.cluster,
            keyspace = %job.keyspace,
            table = %job.table,
            id = job.id,
            attempt = job.attempt,
            "Retries exhausted, leaving fragment for the next pass"
        );
        return StatusCode::OK;
    }

    job.attempt += 1;
    if state.jobs.send(job).await.is_err() {
        tracing::error!("Job channel closed, cannot re-enqueue failed fragment");
    } else {
        state.metrics.jobs_in_flight.inc();
    }
    StatusCode::OK
}

/// Set the current scheduling position filter
async fn handle_nav(
    State(state): State<ReceiverState>,
    Json(nav): Json<Navigation>,
) -> impl IntoResponse {
    tracing::info!(?nav, "Navigation set");
    *state.navigation.write().unwrap() = nav;
    StatusCode::OK
}

/// Report a cluster's track record
async fn handle_progress(
    State(state): State<ReceiverState>,
    Path(cluster): Path<String>,
) -> impl IntoResponse {
    match state.tracker.progress(&TrackKey::cluster(&cluster)) {
        Ok(track) => (StatusCode::OK, Json(track)).into_response(),
        Err(e) => {
            tracing::error!(%cluster, error = %e, "Failed to read cluster record");
            e.to_http_status().into_response()
        }
    }
}

async fn handle_metrics(State(state): State<ReceiverState>) -> impl IntoResponse {
    state.metrics.render()
}
