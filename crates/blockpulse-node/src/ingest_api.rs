//! # Ingestion API
//!
//! Endpoints through which the indexing pipeline feeds chain events into
//! the websocket hub. Every endpoint answers `202 Accepted` once the event
//! is queued for broadcast.
//!
//! | Method | Path | Body | Broadcast |
//! |--------|------|------|-----------|
//! | POST | `/api/ingest/block` | `BlockData` | `newblock`, coinbase `address` pushes |
//! | POST | `/api/ingest/tx` | `MempoolTx` | buffered `newtxs` |
//! | POST | `/api/ingest/mempool` | `MempoolSummary` | `mempool` |
//! | POST | `/api/ingest/address` | `AddressMessage` | `address` |
//! | POST | `/api/ingest/sync` | `{stages, ready}` | `syncstatus` |

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use blockpulse_types::{AddressMessage, BlockData, MempoolSummary, MempoolTx, SyncProgress};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{ApiError, AppState};

/// Create the ingestion routes.
pub fn ingest_routes() -> Router<AppState> {
    Router::new()
        .route("/api/ingest/block", post(ingest_block))
        .route("/api/ingest/tx", post(ingest_tx))
        .route("/api/ingest/mempool", post(ingest_mempool))
        .route("/api/ingest/address", post(ingest_address))
        .route("/api/ingest/sync", post(ingest_sync))
}

/// Sync progress report.
#[derive(Debug, Deserialize)]
pub struct SyncReport {
    /// Progress of each sync stage.
    #[serde(default)]
    pub stages: Vec<SyncProgress>,
    /// Whether the explorer has caught up with the chain.
    #[serde(default)]
    pub ready: bool,
}

#[derive(Serialize)]
struct Accepted {
    accepted: &'static str,
}

fn accepted(kind: &'static str) -> impl IntoResponse {
    (StatusCode::ACCEPTED, Json(Accepted { accepted: kind }))
}

/// Records a new best block.
async fn ingest_block(
    State(state): State<AppState>,
    Json(data): Json<BlockData>,
) -> impl IntoResponse {
    state.metrics.record_ingest("block");
    state.pubsub.store_block(data);
    accepted("block")
}

/// Queues a transaction for the buffered `newtxs` push.
async fn ingest_tx(
    State(state): State<AppState>,
    Json(tx): Json<MempoolTx>,
) -> Result<impl IntoResponse, ApiError> {
    if !tx.is_valid() {
        return Err(ApiError::BadRequest("transaction hash is required".into()));
    }
    state.metrics.record_ingest("tx");
    state.pubsub.publish_new_tx(tx).await?;
    Ok(accepted("tx"))
}

/// Replaces the mempool inventory and signals the refresh.
async fn ingest_mempool(
    State(state): State<AppState>,
    Json(summary): Json<MempoolSummary>,
) -> Result<impl IntoResponse, ApiError> {
    state.metrics.record_ingest("mempool");
    state.source.set_mempool(summary);
    state.pubsub.publish_mempool_refresh().await?;
    Ok(accepted("mempool"))
}

/// Signals activity on an address.
async fn ingest_address(
    State(state): State<AppState>,
    Json(message): Json<AddressMessage>,
) -> Result<impl IntoResponse, ApiError> {
    if !message.is_valid() || message.tx_hash.is_empty() {
        return Err(ApiError::BadRequest(
            "address and txHash are required".into(),
        ));
    }
    state.metrics.record_ingest("address");
    state.pubsub.publish_address_activity(message).await?;
    Ok(accepted("address"))
}

/// Updates the ready flag and pushes sync progress.
async fn ingest_sync(
    State(state): State<AppState>,
    Json(report): Json<SyncReport>,
) -> Result<impl IntoResponse, ApiError> {
    state.metrics.record_ingest("sync");
    let hub = state.pubsub.hub();
    if hub.ready() != report.ready {
        debug!(ready = report.ready, "Explorer readiness changed");
    }
    hub.set_ready(report.ready);
    state.pubsub.publish_sync_status(report.stages).await?;
    Ok(accepted("sync"))
}
