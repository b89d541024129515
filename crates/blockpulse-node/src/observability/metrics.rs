//! Prometheus metrics collection.
//!
//! Covers HTTP requests, ingested chain events and the websocket hub. Hub
//! figures are sampled from [`HubStats`] at scrape time.

use blockpulse_realtime::HubStats;
use parking_lot::RwLock;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::Arc;

/// HTTP request labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request path
    pub path: String,
    /// Response status code
    pub status: u16,
}

/// Ingested event labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct IngestLabels {
    /// Event kind (block, tx, mempool, address, sync)
    pub kind: String,
}

/// Metrics state container.
#[derive(Clone)]
pub struct MetricsState {
    /// Prometheus registry.
    pub registry: Arc<RwLock<Registry>>,
    /// HTTP request counter.
    pub http_requests_total: Family<HttpLabels, Counter>,
    /// HTTP request duration histogram (seconds).
    pub http_request_duration_seconds: Family<HttpLabels, Histogram>,
    /// Chain events received from the indexing pipeline.
    pub ingested_events_total: Family<IngestLabels, Counter>,
    /// WebSocket active connections.
    pub websocket_connections: Gauge,
    /// WebSocket connections since start.
    pub websocket_connections_total: Counter,
    /// Events broadcast by the hub.
    pub hub_events_total: Counter,
    /// Clients dropped for falling behind.
    pub hub_evictions_total: Counter,
    /// Malformed or misrouted events discarded by the hub.
    pub hub_dropped_events_total: Counter,
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsState {
    /// Create a new metrics state with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("blockpulse");

        let http_requests_total = Family::<HttpLabels, Counter>::default();
        registry.register(
            "http_requests",
            "Total HTTP requests",
            http_requests_total.clone(),
        );

        let http_request_duration_seconds =
            Family::<HttpLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 16))
            });
        registry.register(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_request_duration_seconds.clone(),
        );

        let ingested_events_total = Family::<IngestLabels, Counter>::default();
        registry.register(
            "ingested_events",
            "Chain events received for broadcast",
            ingested_events_total.clone(),
        );

        let websocket_connections = Gauge::default();
        registry.register(
            "websocket_connections",
            "Active WebSocket connections",
            websocket_connections.clone(),
        );

        let websocket_connections_total = Counter::default();
        registry.register(
            "websocket_connections_opened",
            "WebSocket connections since start",
            websocket_connections_total.clone(),
        );

        let hub_events_total = Counter::default();
        registry.register(
            "hub_events",
            "Events broadcast to websocket clients",
            hub_events_total.clone(),
        );

        let hub_evictions_total = Counter::default();
        registry.register(
            "hub_evictions",
            "Websocket clients dropped for falling behind",
            hub_evictions_total.clone(),
        );

        let hub_dropped_events_total = Counter::default();
        registry.register(
            "hub_dropped_events",
            "Invalid events discarded by the hub",
            hub_dropped_events_total.clone(),
        );

        Self {
            registry: Arc::new(RwLock::new(registry)),
            http_requests_total,
            http_request_duration_seconds,
            ingested_events_total,
            websocket_connections,
            websocket_connections_total,
            hub_events_total,
            hub_evictions_total,
            hub_dropped_events_total,
        }
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let labels = HttpLabels {
            method: method.to_string(),
            path: path.to_string(),
            status,
        };

        self.http_requests_total.get_or_create(&labels).inc();
        self.http_request_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record an ingested chain event.
    pub fn record_ingest(&self, kind: &str) {
        self.ingested_events_total
            .get_or_create(&IngestLabels {
                kind: kind.to_string(),
            })
            .inc();
    }

    /// Bring hub metrics up to date with a stats snapshot.
    pub fn observe_hub(&self, stats: &HubStats) {
        self.websocket_connections
            .set(stats.current_connections as i64);
        advance(&self.websocket_connections_total, stats.total_connections);
        advance(&self.hub_events_total, stats.total_events);
        advance(&self.hub_evictions_total, stats.evicted_clients);
        advance(&self.hub_dropped_events_total, stats.dropped_events);
    }

    /// Encode metrics for Prometheus scraping.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        let registry = self.registry.read();
        prometheus_client::encoding::text::encode(&mut buffer, &registry)?;
        Ok(buffer)
    }
}

/// Raise a counter to a monotonic total.
fn advance(counter: &Counter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}
