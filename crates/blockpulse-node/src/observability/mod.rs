//! # Observability Module
//!
//! Observability for the blockpulse node:
//!
//! - **Structured Logging**: Pretty or JSON logs with request IDs
//! - **Prometheus Metrics**: HTTP, ingestion and websocket hub metrics
//! - **Request Tracing**: Request ID propagation across handlers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use axum::{middleware, Router};
//! use blockpulse_node::observability::{init_logging, request_id_middleware, LogFormat, MetricsState};
//!
//! init_logging("info", LogFormat::Json);
//!
//! let metrics = MetricsState::new();
//! let app: Router<()> = Router::new()
//!     .layer(middleware::from_fn(request_id_middleware));
//! ```

mod logging;
mod metrics;
pub mod middleware;

pub use logging::{default_filter, init_logging, LogFormat};
pub use metrics::{HttpLabels, IngestLabels, MetricsState};
pub use middleware::{metrics_middleware, request_id_middleware, RequestId, REQUEST_ID_HEADER};
