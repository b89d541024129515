//! # Blockpulse Node
//!
//! Real-time push server for a UTXO block explorer.
//!
//! This crate provides the HTTP and websocket surface around the
//! [`blockpulse_realtime`] hub: the `/ws` endpoint browsers connect to, the
//! ingestion endpoints the indexing pipeline posts chain events to, health
//! probes, Prometheus metrics and the chain node RPC adapter.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Blockpulse Node                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │                    HTTP API Layer                     │  │
//! │  │  • /ws websocket sessions                             │  │
//! │  │  • /api/ingest/* chain event ingestion                │  │
//! │  │  • /health, /api/realtime/stats, /metrics             │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! │                              │                              │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │                   Realtime Hub                        │  │
//! │  │  • Subscriptions and fan-out                          │  │
//! │  │  • Transaction batching and heartbeat                 │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! │                              │                              │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │                 Chain Node RPC                        │  │
//! │  │  • decoderawtransaction / sendrawtransaction          │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cargo run --bin blockpulse-node -- --api-addr 127.0.0.1:7777 --rpc-url http://127.0.0.1:9109
//! ```
//!
//! ## Modules
//!
//! - [`api`] - Application state and router
//! - [`config`] - Layered node configuration
//! - [`health`] - Health check endpoints (liveness, readiness)
//! - [`ingest_api`] - Chain event ingestion endpoints
//! - [`observability`] - Structured logging, metrics, and request tracing
//! - [`realtime_api`] - Websocket endpoint and hub statistics
//! - [`rpc`] - Chain node JSON-RPC adapter
//!
//! ## Example: Serving the API
//!
//! ```rust,no_run
//! use blockpulse_node::api::{create_router, AppState};
//! use blockpulse_node::config::NodeConfig;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = NodeConfig::load(None)?;
//! let state = AppState::new(&config)?;
//! let listener = tokio::net::TcpListener::bind(config.api_addr).await?;
//! axum::serve(listener, create_router(state)).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod health;
pub mod ingest_api;
pub mod observability;
pub mod realtime_api;
pub mod rpc;
