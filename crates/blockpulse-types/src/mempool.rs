//! Mempool transactions and inventory summaries.

use crate::block::BlockSubsidy;
use serde::{Deserialize, Serialize};

/// Stake classification of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    #[default]
    Regular,
    Ticket,
    Vote,
    Revocation,
}

/// A transaction seen entering the mempool.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolTx {
    pub hash: String,
    /// Time first seen, Unix seconds.
    pub time: i64,
    pub size: u32,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    /// Sum of outputs, in coins.
    pub total_out: f64,
    /// Fee paid, in coins.
    pub fees: f64,
    /// Fee per kB, in coins.
    pub fee_rate: f64,
    pub vin_count: u32,
    pub vout_count: u32,
    /// Height of the block a vote is voting on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote_height: Option<i64>,
}

impl MempoolTx {
    /// A transaction summary is usable once it carries a hash.
    pub fn is_valid(&self) -> bool {
        !self.hash.is_empty()
    }
}

/// Inventory of the current mempool.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolSummary {
    /// Height of the best block when the inventory was collected.
    pub last_block_height: i64,
    /// Time of the best block, Unix seconds.
    pub last_block_time: i64,
    /// Time the inventory was collected, Unix seconds.
    pub time: i64,
    pub total_size: u64,
    pub num_regular: u32,
    pub num_tickets: u32,
    pub num_votes: u32,
    pub num_revocations: u32,
    /// Sum of all outputs, in coins.
    pub total_out: f64,
    /// Most recent transactions first.
    pub latest: Vec<MempoolTx>,
    /// Subsidy of the next block, filled in when served to clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsidy: Option<BlockSubsidy>,
}

impl MempoolSummary {
    /// Builds a summary from the current mempool transactions, newest first.
    pub fn from_txs(last_block_height: i64, last_block_time: i64, mut txs: Vec<MempoolTx>) -> Self {
        txs.sort_by(|a, b| b.time.cmp(&a.time));
        let mut summary = Self {
            last_block_height,
            last_block_time,
            time: txs.first().map(|tx| tx.time).unwrap_or(last_block_time),
            ..Default::default()
        };
        for tx in &txs {
            summary.total_size += u64::from(tx.size);
            summary.total_out += tx.total_out;
            match tx.tx_type {
                TxType::Regular => summary.num_regular += 1,
                TxType::Ticket => summary.num_tickets += 1,
                TxType::Vote => summary.num_votes += 1,
                TxType::Revocation => summary.num_revocations += 1,
            }
        }
        summary.latest = txs;
        summary
    }

    /// Total number of transactions counted in the inventory.
    pub fn num_txs(&self) -> u32 {
        self.num_regular + self.num_tickets + self.num_votes + self.num_revocations
    }

    /// Copy of the summary keeping only the `n` latest transactions.
    pub fn short(&self, n: usize) -> Self {
        let mut short = self.clone();
        short.latest.truncate(n);
        short
    }
}
