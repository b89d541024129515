//! Common types used throughout `blockpulse`.
//!
//! This crate provides the chain and mempool data types exchanged between
//! the ingestion pipeline, the real-time hub and connected web clients.

mod block;
mod chain;
mod mempool;

pub use block::{
    BlockData, BlockSubsidy, BlockSummary, HomeInfo, HomeParams, TicketPoolInfo, WebsocketBlock,
};
pub use chain::{calculate_hash_rate, ChainParams};
pub use mempool::{MempoolSummary, MempoolTx, TxType};

use serde::{Deserialize, Serialize};

/// Number of latest mempool transactions included in a mempool push.
pub const NUM_LATEST_MEMPOOL_TXNS: usize = 5;

/// Activity on a watched address: the address and the transaction touching it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressMessage {
    /// Encoded address.
    pub address: String,
    /// Hash of the transaction paying to or spending from the address.
    pub tx_hash: String,
}

impl AddressMessage {
    /// Creates an address message.
    pub fn new(address: impl Into<String>, tx_hash: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            tx_hash: tx_hash.into(),
        }
    }

    /// Creates an address message with no transaction, as used for
    /// subscription filters.
    pub fn filter(address: impl Into<String>) -> Self {
        Self::new(address, String::new())
    }

    /// An address message is structurally valid when it names an address
    /// without whitespace.
    pub fn is_valid(&self) -> bool {
        !self.address.is_empty() && !self.address.chars().any(char::is_whitespace)
    }
}

/// Progress of one stage of the explorer's initial sync.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Human-readable status line.
    pub status: String,
    /// Height reached by this stage.
    pub height: u64,
    /// Height this stage is syncing towards.
    pub target: u64,
    /// Percent complete, 0 to 100.
    pub percent_complete: f64,
}

impl SyncProgress {
    /// Creates a progress entry, deriving the completion percentage.
    pub fn new(status: impl Into<String>, height: u64, target: u64) -> Self {
        let percent_complete = if target == 0 {
            100.0
        } else {
            (height.min(target) as f64 / target as f64) * 100.0
        };
        Self {
            status: status.into(),
            height,
            target,
            percent_complete,
        }
    }
}
