//! HTTP API for the blockpulse node.
//!
//! Wires the websocket endpoint, the ingestion endpoints, health probes and
//! the Prometheus scrape endpoint into one router.

use axum::{
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use blockpulse_realtime::{PubSubHub, RealtimeError, SessionConfig, WebsocketHub};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::NodeConfig;
use crate::health::{health_routes, HealthState};
use crate::ingest_api::ingest_routes;
use crate::observability::{metrics_middleware, request_id_middleware, MetricsState};
use crate::realtime_api::realtime_routes;
use crate::rpc::{RpcError, RpcSource};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast hub with chain state and request handling.
    pub pubsub: Arc<PubSubHub>,
    /// Chain node adapter, also holding the mempool cache.
    pub source: Arc<RpcSource>,
    /// Per-connection tunables.
    pub session: Arc<SessionConfig>,
    /// Prometheus metrics.
    pub metrics: MetricsState,
    /// Health probe state.
    pub health: HealthState,
}

impl AppState {
    /// Build the state and start the hub. Must be called inside a Tokio
    /// runtime.
    pub fn new(config: &NodeConfig) -> Result<Self, RpcError> {
        let source = Arc::new(RpcSource::new(config.rpc.clone(), config.chain.clone())?);
        let hub = WebsocketHub::spawn(config.hub.hub_config());
        let pubsub = Arc::new(PubSubHub::new(hub, source.clone()));
        let health = HealthState::new(pubsub.clone(), source.is_configured());

        Ok(Self {
            pubsub,
            source,
            session: Arc::new(config.hub.session_config()),
            metrics: MetricsState::new(),
            health,
        })
    }
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RealtimeError> for ApiError {
    fn from(err: RealtimeError) -> Self {
        match err {
            RealtimeError::MalformedEvent(_)
            | RealtimeError::InvalidSubscription(_)
            | RealtimeError::MalformedFilterPayload(_) => ApiError::BadRequest(err.to_string()),
            RealtimeError::HubStopped
            | RealtimeError::PublishTimeout(_)
            | RealtimeError::ChannelClosed => ApiError::Unavailable(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Creates the API router.
pub fn create_router(state: AppState) -> Router {
    let metrics = state.metrics.clone();

    Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(realtime_routes())
        .merge(ingest_routes())
        .with_state(state.clone())
        .merge(health_routes(state.health))
        .layer(middleware::from_fn_with_state(metrics, metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Prometheus scrape endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    state.metrics.observe_hub(&state.pubsub.hub().stats());
    let body = state
        .metrics
        .encode()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        body,
    )
        .into_response())
}
