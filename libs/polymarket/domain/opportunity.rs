//! Scanner output and position snapshots: read by the executor, produced
//! and owned by collaborators outside this crate's core.

use super::task::Outcome;
use super::venue::TokenId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A priced, depth-annotated pair candidate. Emitted repeatedly by the
/// opportunity scanner; only meaningful within one evaluation window, and
/// discarded once a task is created from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub venue_a_market_id: String,
    pub venue_b_yes_token: TokenId,
    pub venue_b_no_token: TokenId,
    pub outcome: Outcome,
    pub venue_a_best_price: f64,
    pub venue_b_best_price: f64,
    pub projected_profit_pct: f64,
    pub projected_depth: f64,
    pub observed_at: DateTime<Utc>,
}

/// Venue-reported holding of an outcome token. Read-only from the
/// executor's perspective; used only to validate SELL-task entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub shares: f64,
    pub avg_price: f64,
}
