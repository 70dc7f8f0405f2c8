//! Status receiver behavior, exercised through the router

use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use ringmend::common::{MemStore, RepairMetrics};
use ringmend::server::{create_router, ReceiverState};
use ringmend::{Navigation, Regulator, RepairJob, Tracker};
use tokio::sync::mpsc;
use tower::ServiceExt;

fn state(max_retries: u32) -> (ReceiverState, mpsc::Receiver<RepairJob>) {
    let (tx, rx) = mpsc::channel(8);
    let state = ReceiverState {
        tracker: Arc::new(Tracker::new(Arc::new(MemStore::new()))),
        regulator: Arc::new(Regulator::new(5, Duration::from_secs(1))),
        jobs: tx,
        navigation: Arc::new(RwLock::new(Navigation::default())),
        metrics: Arc::new(RepairMetrics::default()),
        max_retries,
    };
    (state, rx)
}

fn job_json(attempt: u32) -> String {
    format!(
        r#"{{"id":1,"cluster":"main","keyspace":"ks1","table":"cf1",
            "endpoint":"10.0.0.1","start":0,"end":50,
            "callback":"http://localhost:8888/status","attempt":{}}}"#,
        attempt
    )
}

fn post(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_complete_updates_tracker_and_regulator() {
    let (state, _rx) = state(3);
    let tracker = state.tracker.clone();
    let regulator = state.regulator.clone();
    let metrics = state.metrics.clone();
    let router = create_router(state);

    tracker.start_table("main", "ks1", "cf1", 1).unwrap();
    tracker.start_fragment("main", "ks1", "cf1", 1).unwrap();

    let body = format!(
        r#"{{"job":{},"type":"COMPLETE","message":"done"}}"#,
        job_json(0)
    );
    let resp = router.oneshot(post("/status", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    assert!(tracker
        .is_completed("main", "ks1", "cf1", 1, Duration::from_secs(3600))
        .unwrap());
    assert_eq!(metrics.fragments_completed.get(), 1);
    // one observation pushed: the rate is no longer the 1s default
    assert!(regulator.rate("main") < Duration::from_secs(1));
}

#[tokio::test]
async fn test_error_reenqueues_with_bumped_attempt() {
    let (state, mut rx) = state(3);
    let tracker = state.tracker.clone();
    let router = create_router(state);

    tracker.start_fragment("main", "ks1", "cf1", 1).unwrap();

    let body = format!(
        r#"{{"job":{},"type":"ERROR","message":"stream failed"}}"#,
        job_json(0)
    );
    let resp = router.oneshot(post("/status", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let requeued = rx.try_recv().expect("job should be re-enqueued");
    assert_eq!(requeued.id, 1);
    assert_eq!(requeued.attempt, 1);
    assert!(!tracker
        .is_completed("main", "ks1", "cf1", 1, Duration::from_secs(3600))
        .unwrap());
}

#[tokio::test]
async fn test_error_after_max_retries_is_dropped() {
    let (state, mut rx) = state(3);
    let metrics = state.metrics.clone();
    let router = create_router(state);

    let body = format!(
        r#"{{"job":{},"type":"ERROR","message":"still failing"}}"#,
        job_json(3)
    );
    let resp = router.oneshot(post("/status", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    assert!(rx.try_recv().is_err(), "exhausted job must not re-enqueue");
    assert_eq!(metrics.retries_exhausted.get(), 1);
}

#[tokio::test]
async fn test_malformed_payload_is_acknowledged_and_dropped() {
    let (state, mut rx) = state(3);
    let router = create_router(state);

    let resp = router
        .oneshot(post("/status", "{not json".to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_nav_sets_position() {
    let (state, _rx) = state(3);
    let navigation = state.navigation.clone();
    let router = create_router(state);

    let body = r#"{"cluster":"main","keyspace":"ks1","table":""}"#.to_string();
    let resp = router.oneshot(post("/nav", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let nav = navigation.read().unwrap().clone();
    assert_eq!(nav.cluster, "main");
    assert!(nav.matches("main", "ks1", "anything"));
    assert!(!nav.matches("other", "ks1", "anything"));
}

#[tokio::test]
async fn test_progress_and_health_endpoints() {
    let (state, _rx) = state(3);
    let tracker = state.tracker.clone();
    let router = create_router(state);

    tracker.start_cluster("main", 4).unwrap();

    let resp = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/progress/main")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024)
        .await
        .unwrap();
    let track: ringmend::Track = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(track.total, 4);

    let resp = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
