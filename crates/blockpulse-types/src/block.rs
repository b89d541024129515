//! Block summaries and the home page chain overview.

use crate::chain::{calculate_hash_rate, ChainParams};
use serde::{Deserialize, Serialize};

/// Atoms per coin.
const ATOMS_PER_COIN: f64 = 1e8;

/// Summary of a connected block as shown to web clients.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockSummary {
    pub height: i64,
    pub hash: String,
    /// Block time, Unix seconds.
    pub time: i64,
    pub size: u32,
    pub difficulty: f64,
    /// Number of regular transactions.
    pub tx_count: u32,
    pub votes: u16,
    pub tickets: u8,
    pub revocations: u8,
    /// Sum of all outputs, in coins.
    pub total_sent: f64,
    /// Sum of all fees, in coins.
    pub fees: f64,
}

/// Subsidy split of the next block, in atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockSubsidy {
    pub total: i64,
    pub pow: i64,
    pub pos: i64,
    pub dev: i64,
}

/// Live ticket pool statistics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TicketPoolInfo {
    /// Number of live tickets.
    pub size: u32,
    /// Total value locked in tickets, in coins.
    pub value: f64,
    /// Average ticket value, in coins.
    pub val_avg: f64,
    /// Percent of the coin supply staked.
    pub percentage: f64,
    /// Pool size relative to its target, in percent.
    pub percent_target: f64,
    /// Target pool size.
    pub target: u64,
}

/// Constant parameters shown next to the chain overview.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HomeParams {
    pub window_size: u64,
    pub reward_window_size: u64,
    pub block_time_secs: u64,
    pub mean_voting_blocks: i64,
}

/// Chain overview refreshed on every connected block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HomeInfo {
    pub coin_supply: i64,
    pub stake_diff: f64,
    pub next_expected_stake_diff: f64,
    pub difficulty: f64,
    /// Network hash rate, TH/s.
    pub hash_rate: f64,
    /// Hash rate change over the last day, in percent.
    pub hash_rate_change_day: f64,
    /// Hash rate change over the last 30 days, in percent.
    pub hash_rate_change_month: f64,
    pub idx_block_in_window: u64,
    pub idx_in_reward_window: u64,
    pub pool_info: TicketPoolInfo,
    pub next_block_subsidy: BlockSubsidy,
    /// Return of a single vote relative to the ticket price, in percent.
    pub ticket_reward: f64,
    /// Time from ticket purchase to spendable reward.
    pub reward_period: String,
    pub params: HomeParams,
}

impl HomeInfo {
    /// Creates the overview with its constant parameters filled in.
    pub fn new(params: &ChainParams) -> Self {
        Self {
            params: HomeParams {
                window_size: params.stake_diff_window_size,
                reward_window_size: params.subsidy_reduction_interval,
                block_time_secs: params.target_time_per_block_secs,
                mean_voting_blocks: params.mean_voting_blocks(),
            },
            pool_info: TicketPoolInfo {
                target: params.ticket_pool_target(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Refreshes the overview from a newly connected block.
    pub fn apply_block(&mut self, data: &BlockData, params: &ChainParams) {
        let block_time = params.target_time_per_block_secs;
        let hash_rate = calculate_hash_rate(data.block.difficulty, block_time);

        self.hash_rate = hash_rate;
        self.hash_rate_change_day =
            percent_change(hash_rate, data.difficulty_day_ago, block_time);
        self.hash_rate_change_month =
            percent_change(hash_rate, data.difficulty_month_ago, block_time);
        self.difficulty = data.block.difficulty;
        self.coin_supply = data.coin_supply;
        self.stake_diff = data.stake_diff;
        self.next_expected_stake_diff = data.next_expected_stake_diff;
        self.idx_block_in_window = data.idx_block_in_window;
        self.idx_in_reward_window = if params.subsidy_reduction_interval == 0 {
            0
        } else {
            data.block.height.max(0) as u64 % params.subsidy_reduction_interval
        };
        self.next_block_subsidy = data.next_block_subsidy;

        let target = params.ticket_pool_target();
        self.pool_info = match &data.pool_info {
            Some(pool) => {
                let supply = data.coin_supply as f64 / ATOMS_PER_COIN;
                let staked = if supply > 0.0 { pool.value / supply } else { 0.0 };
                TicketPoolInfo {
                    size: pool.size,
                    value: pool.value,
                    val_avg: pool.val_avg,
                    percentage: staked * 100.0,
                    percent_target: if target == 0 {
                        0.0
                    } else {
                        100.0 * pool.size as f64 / target as f64
                    },
                    target,
                }
            }
            None => TicketPoolInfo::default(),
        };

        self.ticket_reward = if self.stake_diff > 0.0 && params.tickets_per_block > 0 {
            let per_vote = data.next_block_subsidy.pos as f64
                / ATOMS_PER_COIN
                / params.tickets_per_block as f64;
            100.0 * per_vote / self.stake_diff
        } else {
            0.0
        };

        // Purchase to vote, then vote to spendable.
        let maturity_blocks = self.params.mean_voting_blocks
            + params.ticket_maturity as i64
            + params.coinbase_maturity as i64;
        let days = maturity_blocks as f64 * block_time as f64 / 86_400.0;
        self.reward_period = format!("{days:.2} days");
    }
}

fn percent_change(current: f64, past_difficulty: Option<f64>, block_time: u64) -> f64 {
    match past_difficulty {
        Some(difficulty) if difficulty > 0.0 => {
            let past = calculate_hash_rate(difficulty, block_time);
            100.0 * (current - past) / past
        }
        _ => 0.0,
    }
}

/// Everything the ingestion pipeline reports about a newly connected block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockData {
    pub block: BlockSummary,
    /// Coin supply after this block, in atoms.
    pub coin_supply: i64,
    pub stake_diff: f64,
    pub next_expected_stake_diff: f64,
    pub idx_block_in_window: u64,
    pub next_block_subsidy: BlockSubsidy,
    pub pool_info: Option<TicketPoolInfo>,
    /// Difficulty one day before this block, when known.
    pub difficulty_day_ago: Option<f64>,
    /// Difficulty thirty days before this block, when known.
    pub difficulty_month_ago: Option<f64>,
    /// Hash of the block's coinbase transaction.
    pub coinbase_hash: String,
    /// Addresses paid by the coinbase outputs.
    pub coinbase_addresses: Vec<String>,
}

/// Payload of a new block push: the block and the refreshed overview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsocketBlock {
    pub block: BlockSummary,
    pub extra: HomeInfo,
}
