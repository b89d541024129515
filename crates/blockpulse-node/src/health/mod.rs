//! # Health Check Module
//!
//! Health checks for deployments:
//!
//! - **Liveness Probe**: Is the process running?
//! - **Readiness Probe**: Is the hub running and the explorer synced?
//!
//! ## Usage
//!
//! ```rust,ignore
//! use axum::Router;
//! use blockpulse_node::health::{health_routes, HealthState};
//!
//! let health_state = HealthState::new(pubsub.clone(), rpc_configured);
//!
//! let app: Router<()> = Router::new()
//!     .merge(health_routes(health_state));
//! ```

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use blockpulse_realtime::{HubState, PubSubHub};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Health status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is healthy.
    Up,
    /// Component is unhealthy.
    Down,
    /// Component status is unknown.
    Unknown,
}

/// Individual component health.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    /// Component status.
    pub status: HealthStatus,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ComponentHealth {
    fn with_details(status: HealthStatus, details: serde_json::Value) -> Self {
        Self {
            status,
            details: Some(details),
        }
    }
}

/// Liveness probe response.
#[derive(Debug, Clone, Serialize)]
pub struct LivenessResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Readiness component checks.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessChecks {
    /// Websocket hub health.
    pub realtime: ComponentHealth,
    /// Chain sync state.
    pub chain: ComponentHealth,
    /// Chain node RPC availability.
    pub rpc: ComponentHealth,
}

/// Readiness probe response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Component health checks.
    pub checks: ReadinessChecks,
}

/// Overall health response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Version info.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
    /// Component checks.
    pub checks: ReadinessChecks,
}

/// Health state, reading live figures from the hub.
#[derive(Clone)]
pub struct HealthState {
    start_time: Instant,
    pubsub: Arc<PubSubHub>,
    rpc_configured: bool,
}

impl HealthState {
    /// Create a new health state.
    pub fn new(pubsub: Arc<PubSubHub>, rpc_configured: bool) -> Self {
        Self {
            start_time: Instant::now(),
            pubsub,
            rpc_configured,
        }
    }

    /// Get uptime in seconds.
    pub fn uptime(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Whether clients can be served: hub running and chain synced.
    pub fn is_ready(&self) -> bool {
        let hub = self.pubsub.hub();
        hub.state() == HubState::Running && hub.ready()
    }

    fn realtime_health(&self) -> ComponentHealth {
        let hub = self.pubsub.hub();
        let status = match hub.state() {
            HubState::Running => HealthStatus::Up,
            HubState::Draining | HubState::Stopped => HealthStatus::Down,
        };
        ComponentHealth::with_details(
            status,
            serde_json::json!({
                "state": hub.state(),
                "connections": hub.connection_count(),
            }),
        )
    }

    fn chain_health(&self) -> ComponentHealth {
        let height = self.pubsub.latest_block().map(|b| b.block.height);
        let status = if self.pubsub.hub().ready() {
            HealthStatus::Up
        } else {
            HealthStatus::Down
        };
        ComponentHealth::with_details(
            status,
            serde_json::json!({
                "synced": status == HealthStatus::Up,
                "best_height": height,
            }),
        )
    }

    fn rpc_health(&self) -> ComponentHealth {
        // Only configuration is known without a round trip.
        let status = if self.rpc_configured {
            HealthStatus::Unknown
        } else {
            HealthStatus::Down
        };
        ComponentHealth::with_details(
            status,
            serde_json::json!({ "configured": self.rpc_configured }),
        )
    }

    fn readiness_checks(&self) -> ReadinessChecks {
        ReadinessChecks {
            realtime: self.realtime_health(),
            chain: self.chain_health(),
            rpc: self.rpc_health(),
        }
    }
}

/// Create health check routes.
pub fn health_routes<S>(state: HealthState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .with_state(state)
}

fn status_code(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Up => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Overall health handler.
async fn health_handler(State(state): State<HealthState>) -> Response {
    let checks = state.readiness_checks();
    let overall_status = if state.is_ready() {
        HealthStatus::Up
    } else {
        HealthStatus::Down
    };

    let response = HealthResponse {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime(),
        checks,
    };

    (status_code(overall_status), Json(response)).into_response()
}

/// Liveness probe handler.
async fn liveness_handler(State(state): State<HealthState>) -> Response {
    let response = LivenessResponse {
        status: HealthStatus::Up,
        uptime_seconds: state.uptime(),
    };

    (StatusCode::OK, Json(response)).into_response()
}

/// Readiness probe handler.
async fn readiness_handler(State(state): State<HealthState>) -> Response {
    let status = if state.is_ready() {
        HealthStatus::Up
    } else {
        HealthStatus::Down
    };
    let response = ReadinessResponse {
        status,
        checks: state.readiness_checks(),
    };

    (status_code(status), Json(response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RpcConfig;
    use crate::rpc::RpcSource;
    use blockpulse_realtime::{HubConfig, WebsocketHub};
    use blockpulse_types::ChainParams;

    fn health_state() -> HealthState {
        let hub = WebsocketHub::spawn(HubConfig::default());
        let source = RpcSource::new(RpcConfig::default(), ChainParams::mainnet()).unwrap();
        let pubsub = Arc::new(PubSubHub::new(hub, Arc::new(source)));
        HealthState::new(pubsub, false)
    }

    #[tokio::test]
    async fn test_ready_follows_hub() {
        let state = health_state();
        assert!(!state.is_ready());

        state.pubsub.hub().set_ready(true);
        assert!(state.is_ready());

        let checks = state.readiness_checks();
        assert_eq!(checks.realtime.status, HealthStatus::Up);
        assert_eq!(checks.chain.status, HealthStatus::Up);
        assert_eq!(checks.rpc.status, HealthStatus::Down);

        state.pubsub.hub().stop();
        state.pubsub.hub().stopped().await;
        assert!(!state.is_ready());
        assert_eq!(state.readiness_checks().realtime.status, HealthStatus::Down);
    }
}
