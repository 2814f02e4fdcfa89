//! Task domain entity: the primary unit of work driven by the executor.

use super::venue::{OrderRef, TaskId, TokenId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a task opens a new delta-neutral position (BUY) or unwinds one
/// already held (SELL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

/// Which outcome the Venue-A leg trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Yes,
    No,
}

/// Execution style for the Venue-A leg. MAKER rests at a limit price with no
/// fixed deadline pressure; TAKER is latency-sensitive and carries the
/// tighter default order timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    Maker,
    Taker,
}

/// Why a task stopped progressing. Carried alongside terminal states so the
/// registry can surface an operator-facing reason without re-deriving it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    OrderTimeout,
    CostInvalid,
    PriceInvalid,
    PositionInsufficient,
    VenueCancelled,
    ExternalCancel,
    HedgeFailedAfterLossHedge,
    FilledButEmpty,
}

/// Task lifecycle state. See the state diagram in the expanded specification
/// for the full transition table; this enum only names the states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Created,
    Submitted,
    PartiallyFilled,
    Hedging,
    Paused,
    LossHedge,
    Completed { loss_hedge: bool },
    Cancelled { reason: CancelReason },
    Failed { reason: CancelReason },
    HedgeFailed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed { .. }
                | TaskStatus::Cancelled { .. }
                | TaskStatus::Failed { .. }
                | TaskStatus::HedgeFailed
        )
    }
}

/// Immutable configuration a task is created with. Never mutated after
/// construction; the executor clones it into an `Arc` so cloning for a
/// spawned subtask never touches the mutable half of task state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub id: TaskId,
    pub direction: Direction,
    pub outcome: Outcome,
    pub venue_a_market_id: String,
    pub venue_b_yes_token: TokenId,
    pub venue_b_no_token: TokenId,
    pub inverted: bool,
    pub limit_price: f64,
    pub max_hedge_price: Option<f64>,
    pub min_hedge_price: Option<f64>,
    pub target_qty: f64,
    pub fee_bps: u32,
    pub tick_size: f64,
    pub neg_risk: bool,
    pub strategy: Strategy,
    pub max_total_cost: Option<f64>,
    pub order_timeout_ms: u64,
    pub max_hedge_retries: u32,
    /// Treated leniently by the cost guard when Venue B's WS connection
    /// drops; sports markets poll a cache instead of forcing INVALID.
    pub sports_category: bool,
}

/// Mutable progress state, updated only by the owning executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProgress {
    pub status: TaskStatus,
    pub predict_filled_qty: f64,
    pub hedged_qty: f64,
    pub predict_avg_price: f64,
    pub hedge_avg_price: f64,
    /// Price/quantity actually used for submission, set once by entry
    /// validation (tick-size/decimal aligned from the raw reference price).
    pub aligned_price: f64,
    pub aligned_qty: f64,
    pub actual_profit: f64,
    pub pause_count: u32,
    pub hedge_retry_count: u32,
    pub active_order: Option<OrderRef>,
    pub created_at: DateTime<Utc>,
    pub first_status_at: Option<DateTime<Utc>>,
    pub first_fill_at: Option<DateTime<Utc>>,
    pub first_hedge_fill_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl TaskProgress {
    pub fn new() -> Self {
        Self {
            status: TaskStatus::Created,
            predict_filled_qty: 0.0,
            hedged_qty: 0.0,
            predict_avg_price: 0.0,
            hedge_avg_price: 0.0,
            aligned_price: 0.0,
            aligned_qty: 0.0,
            actual_profit: 0.0,
            pause_count: 0,
            hedge_retry_count: 0,
            active_order: None,
            created_at: Utc::now(),
            first_status_at: None,
            first_fill_at: None,
            first_hedge_fill_at: None,
            completed_at: None,
            last_error: None,
        }
    }
}

impl Default for TaskProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Full task snapshot: config plus current progress, as handed out by the
/// registry's read-only accessors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub config: TaskConfig,
    pub progress: TaskProgress,
}
