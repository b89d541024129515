//! Blockpulse Node - real-time push server for a block explorer.
//!
//! This is the main entry point for running the websocket hub.

use anyhow::Context;
use blockpulse_node::api::{create_router, AppState};
use blockpulse_node::config::NodeConfig;
use blockpulse_node::observability::{init_logging, LogFormat};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Blockpulse Node - live block, mempool and address pushes
#[derive(Parser, Debug)]
#[command(name = "blockpulse-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API listen address
    #[arg(long)]
    api_addr: Option<SocketAddr>,

    /// Chain node JSON-RPC endpoint
    #[arg(long)]
    rpc_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn apply(self, config: &mut NodeConfig) {
        if let Some(addr) = self.api_addr {
            config.api_addr = addr;
        }
        if let Some(url) = self.rpc_url {
            config.rpc.url = url;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if self.log_json {
            config.log_json = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config =
        NodeConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    args.apply(&mut config);
    config.validate()?;

    init_logging(&config.log_level, LogFormat::from_json_flag(config.log_json));

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting blockpulse node");
    tracing::info!(
        api_addr = %config.api_addr,
        rpc_configured = !config.rpc.url.is_empty(),
        network = %config.chain.name,
        client_queue_size = config.hub.client_queue_size,
        "Node configuration"
    );

    let state = AppState::new(&config).context("failed to create chain node client")?;
    let hub = state.pubsub.hub().clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.api_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.api_addr))?;
    tracing::info!(addr = %config.api_addr, "Node is ready. Press Ctrl+C to stop.");

    let shutdown_hub = hub.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
            // Ends websocket sessions so the server can drain.
            shutdown_hub.stop();
        })
        .await
        .context("server error")?;

    hub.stop();
    hub.stopped().await;
    tracing::info!("Blockpulse node stopped");
    Ok(())
}
