//! Fill data model: the two independent notification paths the aggregator
//! merges, plus the record it produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One on-chain `OrderFilled` log decoded off Venue A's block-event stream.
/// `(tx_hash, log_index)` is the canonical dedup key and is kept as an
/// opaque string, never parsed back into components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillEvent {
    pub order_hash: String,
    pub maker: String,
    pub taker: String,
    pub maker_amount_filled: f64,
    pub taker_amount_filled: f64,
    pub fee: f64,
    pub block_number: u64,
    pub tx_hash: String,
    pub log_index: u64,
    pub timestamp: DateTime<Utc>,
}

impl FillEvent {
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.tx_hash, self.log_index)
    }
}

/// A single REST `getOrderStatus` observation, normalised to shares.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RestOrderState {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestFillReport {
    pub state: RestOrderState,
    pub filled_qty: f64,
    pub remaining_qty: f64,
    pub avg_price: f64,
    pub cancel_reason: Option<String>,
    pub report_timestamp: DateTime<Utc>,
}

/// Merged view the Fill Aggregator publishes after each observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillRecord {
    pub total_filled: f64,
    pub new_fill_delta: f64,
    pub is_complete: bool,
    pub first_fill_timestamp: Option<DateTime<Utc>>,
    pub rest_state: Option<RestOrderState>,
}
