//! Network parameters and derived chain statistics.

use serde::{Deserialize, Serialize};

/// Consensus parameters of the network the explorer follows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainParams {
    /// Network name (mainnet, testnet, simnet).
    pub name: String,
    /// Target block interval in seconds.
    pub target_time_per_block_secs: u64,
    /// Ticket pool size multiplier.
    pub ticket_pool_size: u64,
    /// Votes per block.
    pub tickets_per_block: u64,
    /// Blocks before a purchased ticket may vote.
    pub ticket_maturity: u64,
    /// Blocks before a ticket expires unvoted.
    pub ticket_expiry: u64,
    /// Blocks before coinbase outputs may be spent.
    pub coinbase_maturity: u64,
    /// Stake difficulty adjustment window.
    pub stake_diff_window_size: u64,
    /// Blocks per subsidy reduction.
    pub subsidy_reduction_interval: u64,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl ChainParams {
    /// Main network parameters.
    pub fn mainnet() -> Self {
        Self {
            name: "mainnet".to_string(),
            target_time_per_block_secs: 300,
            ticket_pool_size: 8192,
            tickets_per_block: 5,
            ticket_maturity: 256,
            ticket_expiry: 40960,
            coinbase_maturity: 256,
            stake_diff_window_size: 144,
            subsidy_reduction_interval: 6144,
        }
    }

    /// Simulation network parameters.
    pub fn simnet() -> Self {
        Self {
            name: "simnet".to_string(),
            target_time_per_block_secs: 1,
            ticket_pool_size: 64,
            tickets_per_block: 5,
            ticket_maturity: 16,
            ticket_expiry: 384,
            coinbase_maturity: 16,
            stake_diff_window_size: 8,
            subsidy_reduction_interval: 128,
        }
    }

    /// Target number of live tickets in the pool.
    pub fn ticket_pool_target(&self) -> u64 {
        self.ticket_pool_size * self.tickets_per_block
    }

    /// Expected number of blocks a mature ticket waits before voting.
    ///
    /// Each block draws `tickets_per_block` of the target pool, so the wait
    /// is geometric, truncated at ticket expiry.
    pub fn mean_voting_blocks(&self) -> i64 {
        let target = self.ticket_pool_target();
        if target == 0 || self.tickets_per_block == 0 {
            return 0;
        }
        let p = self.tickets_per_block as f64 / target as f64;
        let survive = (1.0 - p).powf(self.ticket_expiry as f64);
        ((1.0 - survive) / p).round() as i64
    }
}

/// Network hash rate in TH/s implied by a difficulty and block interval.
pub fn calculate_hash_rate(difficulty: f64, target_time_per_block_secs: u64) -> f64 {
    if target_time_per_block_secs == 0 {
        return 0.0;
    }
    difficulty * 2f64.powi(32) / target_time_per_block_secs as f64 / 1e12
}
