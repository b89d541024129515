//! Chain node JSON-RPC adapter.
//!
//! [`RpcSource`] answers the websocket `decodetx` and `sendtx` requests by
//! forwarding them to the chain node, and serves the mempool summary last
//! pushed by the indexing pipeline.

use crate::config::RpcConfig;
use async_trait::async_trait;
use blockpulse_realtime::{DataSource, RealtimeError};
use blockpulse_types::{ChainParams, MempoolSummary};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// Chain node RPC errors.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// No RPC endpoint configured.
    #[error("chain node RPC not configured")]
    NotConfigured,
    /// Transport failure.
    #[error("RPC request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The node answered with an error object.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// Node error code.
        code: i64,
        /// Node error message.
        message: String,
    },
    /// The reply did not have the expected shape.
    #[error("invalid RPC response: {0}")]
    InvalidResponse(String),
}

impl From<RpcError> for RealtimeError {
    fn from(err: RpcError) -> Self {
        match err {
            // Surface the node's own message to websocket clients.
            RpcError::Rpc { message, .. } => RealtimeError::Source(message),
            other => RealtimeError::Source(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// [`DataSource`] backed by the chain node RPC and a mempool cache.
#[derive(Debug)]
pub struct RpcSource {
    client: reqwest::Client,
    config: RpcConfig,
    params: ChainParams,
    mempool: RwLock<Option<MempoolSummary>>,
    next_id: AtomicU64,
}

impl RpcSource {
    /// Create the adapter. No connection is made until the first call.
    pub fn new(config: RpcConfig, params: ChainParams) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("blockpulse/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            params,
            mempool: RwLock::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    /// Whether an RPC endpoint is configured.
    pub fn is_configured(&self) -> bool {
        !self.config.url.is_empty()
    }

    /// Replace the cached mempool summary.
    pub fn set_mempool(&self, summary: MempoolSummary) {
        trace!(txs = summary.num_txs(), "Mempool summary updated");
        *self.mempool.write() = Some(summary);
    }

    /// Issue one JSON-RPC call.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, RpcError> {
        if !self.is_configured() {
            return Err(RpcError::NotConfigured);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let mut request = self.client.post(&self.config.url).json(&body);
        if let Some(user) = &self.config.user {
            request = request.basic_auth(user, self.config.password.as_ref());
        }

        debug!(method, id, "Calling chain node");
        let response: RpcResponse = request.send().await?.json().await?;
        parse_response(response)
    }
}

fn parse_response<T: DeserializeOwned>(response: RpcResponse) -> Result<T, RpcError> {
    if let Some(error) = response.error {
        return Err(RpcError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    let result = response
        .result
        .ok_or_else(|| RpcError::InvalidResponse("missing result".into()))?;
    serde_json::from_value(result).map_err(|e| RpcError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl DataSource for RpcSource {
    async fn decode_raw_transaction(&self, hex: &str) -> Result<Value, RealtimeError> {
        Ok(self.call("decoderawtransaction", json!([hex])).await?)
    }

    async fn send_raw_transaction(&self, hex: &str) -> Result<String, RealtimeError> {
        Ok(self.call("sendrawtransaction", json!([hex])).await?)
    }

    fn mempool_summary(&self) -> Option<MempoolSummary> {
        self.mempool.read().clone()
    }

    fn chain_params(&self) -> &ChainParams {
        &self.params
    }
}
