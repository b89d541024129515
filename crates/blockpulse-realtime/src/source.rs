//! Chain data consumed by the pub/sub layer.

use crate::error::RealtimeError;
use async_trait::async_trait;
use blockpulse_types::{ChainParams, MempoolSummary};

/// Chain and mempool access needed to answer client requests.
///
/// Implemented by an adapter owned by the embedding application, typically
/// backed by the chain node's RPC interface and a mempool collector.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Decode a hex-encoded raw transaction into its JSON form.
    async fn decode_raw_transaction(&self, hex: &str) -> Result<serde_json::Value, RealtimeError>;

    /// Broadcast a hex-encoded raw transaction, returning its id.
    async fn send_raw_transaction(&self, hex: &str) -> Result<String, RealtimeError>;

    /// Current mempool summary, if one has been collected.
    fn mempool_summary(&self) -> Option<MempoolSummary>;

    /// Parameters of the chain being served.
    fn chain_params(&self) -> &ChainParams;
}
