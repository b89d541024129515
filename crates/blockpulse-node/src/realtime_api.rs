//! Real-time WebSocket API for live updates.
//!
//! This module provides WebSocket endpoints for real-time communication:
//!
//! - `/ws` - Main WebSocket endpoint for explorer pushes
//! - `/api/realtime/stats` - Statistics about real-time connections
//!
//! ## WebSocket Protocol
//!
//! Every frame is one JSON object with an event id and a string payload:
//!
//! ```json
//! // Subscribe to new blocks
//! {"event_id": "subscribe", "message": "newblock"}
//!
//! // Watch an address
//! {"event_id": "subscribe", "message": "address:DsExampleAddress"}
//!
//! // Server reply
//! {"event_id": "subscribeResp", "message": "newblock subscribe ok"}
//! ```
//!
//! Requests over `max_request_bytes` are answered with `Request too large`.
//! The websocket transport itself caps frames at twice that limit (at least
//! 64 KiB); a larger frame fails the read and ends the session without a
//! reply.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use blockpulse_realtime::{serve_connection, ClientMetadata, Frame, HubState, HubStats};
use futures::{future, SinkExt, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::AppState;

/// Floor for the transport frame limit, above which requests are
/// rejected by the protocol layer instead of the transport.
const MIN_FRAME_BYTES: usize = 64 * 1024;

/// Create the real-time API routes.
pub fn realtime_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/realtime/stats", get(get_stats))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let metadata = connection_metadata(&headers);
    ws.max_message_size(frame_limit(state.session.max_request_bytes))
        .on_upgrade(move |socket| handle_socket(socket, state, metadata))
}

/// Transport frame cap for a request size limit.
fn frame_limit(max_request_bytes: usize) -> usize {
    max_request_bytes.saturating_mul(2).max(MIN_FRAME_BYTES)
}

fn connection_metadata(headers: &HeaderMap) -> ClientMetadata {
    let header_str = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };

    let mut metadata = ClientMetadata::now();
    metadata.user_agent = header_str(header::USER_AGENT);
    metadata.ip_address = header_str(header::HeaderName::from_static("x-forwarded-for"))
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()));
    metadata
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState, metadata: ClientMetadata) {
    let (ws_sender, ws_receiver) = socket.split();

    let sink = ws_sender
        .with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text.into()))));
    let stream = ws_receiver.map(|msg| {
        msg.map(|msg| match msg {
            Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            Message::Close(_) => Frame::Close,
            // Pongs are sent by axum.
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => Frame::Control,
        })
    });

    let ip = metadata.ip_address.clone().unwrap_or_default();
    match serve_connection(&state.pubsub, metadata, stream, sink, &state.session).await {
        Ok(end) => info!(ip = %ip, end = ?end, "WebSocket client disconnected"),
        Err(e) => warn!(ip = %ip, error = %e, "WebSocket session rejected"),
    }
    debug!(
        connections = state.pubsub.hub().connection_count(),
        "Connection count after disconnect"
    );
}

/// Statistics response.
#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    stats: HubStats,
    state: HubState,
    ready: bool,
}

/// Get real-time statistics.
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    let hub = state.pubsub.hub();
    Json(StatsResponse {
        stats: hub.stats(),
        state: hub.state(),
        ready: hub.ready(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_frame_limit_leaves_room_for_oversized_requests() {
        assert_eq!(frame_limit(1 << 20), 2 << 20);
        assert_eq!(frame_limit(16), MIN_FRAME_BYTES);
        assert_eq!(frame_limit(usize::MAX), usize::MAX);
        assert!(frame_limit(100_000) > 100_000);
    }

    #[test]
    fn test_connection_metadata() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("explorer-ui/1.0"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));

        let metadata = connection_metadata(&headers);
        assert_eq!(metadata.user_agent.as_deref(), Some("explorer-ui/1.0"));
        assert_eq!(metadata.ip_address.as_deref(), Some("203.0.113.7"));
        assert!(metadata.connected_at > 0);

        let bare = connection_metadata(&HeaderMap::new());
        assert!(bare.user_agent.is_none());
        assert!(bare.ip_address.is_none());
    }
}
