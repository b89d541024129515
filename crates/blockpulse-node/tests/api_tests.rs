//! HTTP API tests
//!
//! Drives the full router with `oneshot` requests: health probes, ingestion,
//! hub statistics and metrics.

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use blockpulse_node::api::{create_router, AppState};
use blockpulse_node::config::NodeConfig;
use blockpulse_node::observability::REQUEST_ID_HEADER;
use blockpulse_realtime::DataSource;
use blockpulse_types::{BlockData, BlockSummary, SyncProgress};
use serde_json::{json, Value};
use tower::ServiceExt;

fn setup() -> (AppState, Router) {
    let state = AppState::new(&NodeConfig::default()).unwrap();
    let app = create_router(state.clone());
    (state, app)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn post(app: &Router, uri: &str, body: Value) -> StatusCode {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap().status()
}

fn block(height: i64) -> BlockData {
    BlockData {
        block: BlockSummary {
            height,
            hash: format!("{height:064x}"),
            time: 1_700_000_000,
            difficulty: 1e9,
            ..Default::default()
        },
        coinbase_hash: "cb".repeat(32),
        coinbase_addresses: vec!["DsMinerAddress".to_string()],
        ..Default::default()
    }
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_liveness() {
    let (_, app) = setup();
    let (status, body) = get(&app, "/health/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "up");
}

#[tokio::test]
async fn test_readiness_follows_sync_report() {
    let (_, app) = setup();

    let (status, body) = get(&app, "/health/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["checks"]["realtime"]["status"], "up");
    assert_eq!(body["checks"]["chain"]["status"], "down");

    let report = json!({
        "stages": [SyncProgress::new("Blocks synced", 500, 500)],
        "ready": true,
    });
    assert_eq!(post(&app, "/api/ingest/sync", report).await, StatusCode::ACCEPTED);

    let (status, body) = get(&app, "/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "up");
}

#[tokio::test]
async fn test_not_ready_after_hub_stop() {
    let (state, app) = setup();
    state.pubsub.hub().set_ready(true);
    assert_eq!(get(&app, "/health/ready").await.0, StatusCode::OK);

    state.pubsub.hub().stop();
    state.pubsub.hub().stopped().await;

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["checks"]["realtime"]["details"]["state"], "stopped");
}

// ============================================================================
// Ingestion
// ============================================================================

#[tokio::test]
async fn test_ingest_block_updates_chain_state() {
    let (state, app) = setup();

    let body = serde_json::to_value(block(120)).unwrap();
    assert_eq!(post(&app, "/api/ingest/block", body).await, StatusCode::ACCEPTED);

    let latest = state.pubsub.latest_block().unwrap();
    assert_eq!(latest.block.height, 120);
    assert_eq!(state.pubsub.home_info().difficulty, 1e9);

    let (_, body) = get(&app, "/health").await;
    assert_eq!(body["checks"]["chain"]["details"]["best_height"], 120);
}

#[tokio::test]
async fn test_ingest_tx_validation() {
    let (_, app) = setup();

    let valid = json!({"hash": "ab".repeat(32), "time": 1_700_000_000, "size": 250});
    assert_eq!(post(&app, "/api/ingest/tx", valid).await, StatusCode::ACCEPTED);

    let missing_hash = json!({"size": 250});
    assert_eq!(post(&app, "/api/ingest/tx", missing_hash).await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ingest_address_validation() {
    let (_, app) = setup();

    let valid = json!({"address": "DsWatched", "txHash": "ef".repeat(32)});
    assert_eq!(post(&app, "/api/ingest/address", valid).await, StatusCode::ACCEPTED);

    let no_tx = json!({"address": "DsWatched", "txHash": ""});
    assert_eq!(post(&app, "/api/ingest/address", no_tx).await, StatusCode::BAD_REQUEST);

    let spaced = json!({"address": "Ds Watched", "txHash": "ef"});
    assert_eq!(post(&app, "/api/ingest/address", spaced).await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ingest_mempool_fills_cache() {
    let (state, app) = setup();
    assert!(state.source.mempool_summary().is_none());

    let summary = json!({"last_block_height": 42, "num_regular": 3});
    assert_eq!(post(&app, "/api/ingest/mempool", summary).await, StatusCode::ACCEPTED);

    let cached = state.source.mempool_summary().unwrap();
    assert_eq!(cached.last_block_height, 42);
    assert_eq!(cached.num_regular, 3);
}

#[tokio::test]
async fn test_ingest_rejected_after_shutdown() {
    let (state, app) = setup();
    state.pubsub.hub().stop();
    state.pubsub.hub().stopped().await;

    let tx = json!({"hash": "cd".repeat(32)});
    assert_eq!(
        post(&app, "/api/ingest/tx", tx).await,
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn test_ingest_malformed_body() {
    let (_, app) = setup();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/ingest/tx")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
}

// ============================================================================
// Realtime, metrics and middleware
// ============================================================================

#[tokio::test]
async fn test_realtime_stats() {
    let (_, app) = setup();
    let (status, body) = get(&app, "/api/realtime/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_connections"], 0);
    assert_eq!(body["total_connections"], 0);
    assert_eq!(body["state"], "running");
    assert_eq!(body["ready"], false);
}

#[tokio::test]
async fn test_ws_requires_upgrade() {
    let (_, app) = setup();
    let (status, _) = get(&app, "/ws").await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (_, app) = setup();
    let body = serde_json::to_value(block(7)).unwrap();
    post(&app, "/api/ingest/block", body).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("blockpulse_ingested_events_total{kind=\"block\"} 1"));
    assert!(text.contains("blockpulse_websocket_connections"));
    assert!(text.contains("blockpulse_http_requests_total"));
}

#[tokio::test]
async fn test_request_id_propagation() {
    let (_, app) = setup();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health/live")
                .header(REQUEST_ID_HEADER, "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-123");

    let response = app
        .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
}
