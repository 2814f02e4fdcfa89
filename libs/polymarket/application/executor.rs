//! Task Executor: one instance per task, driving the state machine across
//! CREATED -> SUBMITTED -> PARTIALLY_FILLED -> HEDGING -> COMPLETED (with
//! cancel/loss-hedge/failure branches).
//!
//! Structurally modeled on `TakerTask::run`'s tick loop (config-gated enable
//! check, a `tokio::select!`-driven loop body, an external shutdown signal)
//! generalized from a single-shot imbalance check into the full multi-state
//! machine. State is held as `parking_lot::RwLock<TaskProgress>` rather than
//! a channel-actor, with immutable config kept in a separate `Arc<TaskConfig>`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::application::fill_aggregator::FillAggregator;
use crate::application::guard::{CostGuard, GuardBound, GuardTransition};
use crate::application::log_sink::{LogSink, Priority};
use crate::config::ExecutorConfig;
use crate::domain::{
    CancelReason, Direction, OrderRef, RestOrderState, TaskConfig, TaskId, TaskProgress, TaskStatus,
};
use crate::infrastructure::cache::CacheKey;
use crate::infrastructure::client::clob::Side as ClobSide;
use crate::infrastructure::error::ErrorClass;
use crate::infrastructure::{GatewayA, GatewayB, OrderbookCache};

/// Minimum remainder, in shares, below which a hedge residual is treated as
/// dust and the task completes without a further hedge attempt.
const MIN_HEDGE_THRESHOLD: f64 = 2.0;
const HEDGE_RETRY_SLEEP: Duration = Duration::from_millis(300);
const LOSS_HEDGE_POLL_INTERVAL: Duration = Duration::from_secs(5);
const REBATE: f64 = 0.10;

/// Entry-validation top-of-book fetch: retries before falling back to the
/// task's stored reference prices.
const ENTRY_FETCH_RETRIES: u32 = 3;
const ENTRY_FETCH_BACKOFF: Duration = Duration::from_secs(1);
const QTY_DECIMALS: f64 = 100_000.0;

#[derive(Debug, Clone)]
pub struct TaskChangeEvent {
    pub task_id: TaskId,
    pub status: TaskStatus,
}

pub struct ExecutorDeps {
    pub gateway_a: Arc<GatewayA>,
    pub gateway_b: Arc<GatewayB>,
    pub cache: Arc<OrderbookCache>,
    pub fills: Arc<FillAggregator>,
    pub log_sink: Arc<LogSink>,
    pub executor_cfg: ExecutorConfig,
    pub events_tx: broadcast::Sender<TaskChangeEvent>,
}

pub struct TaskHandle {
    pub config: Arc<TaskConfig>,
    pub progress: Arc<RwLock<TaskProgress>>,
    pub cancel: CancellationToken,
    pub join: tokio::task::JoinHandle<()>,
}

pub fn spawn(config: TaskConfig, deps: Arc<ExecutorDeps>) -> TaskHandle {
    let config = Arc::new(config);
    let progress = Arc::new(RwLock::new(TaskProgress::new()));
    let cancel = CancellationToken::new();

    let executor = TaskExecutor {
        config: config.clone(),
        progress: progress.clone(),
        cancel: cancel.clone(),
        deps,
    };
    let join = tokio::spawn(executor.run());

    TaskHandle { config, progress, cancel, join }
}

fn fee(price: f64, bps: u32) -> f64 {
    (bps as f64 / 10_000.0) * price.min(1.0 - price) * (1.0 - REBATE)
}

/// Quantity-weighted running average, folding `new_qty` shares at `new_price`
/// into an existing average taken over `old_qty` shares.
fn weighted_avg(old_avg: f64, old_qty: f64, new_price: f64, new_qty: f64) -> f64 {
    let total = old_qty + new_qty;
    if total <= 0.0 {
        return new_price;
    }
    (old_avg * old_qty + new_price * new_qty) / total
}

fn align_up(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return price;
    }
    (price / tick).ceil() * tick
}

fn align_down(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return price;
    }
    (price / tick).floor() * tick
}

fn align_qty(qty: f64) -> f64 {
    (qty * QTY_DECIMALS).round() / QTY_DECIMALS
}

/// YES/NO are complementary; the hedge leg trades the opposite token unless
/// the two venues pose the question as complements (`inverted`).
fn hedge_token_for(config: &TaskConfig) -> &crate::domain::TokenId {
    let yes_is_predict = !config.inverted;
    match (config.outcome, yes_is_predict) {
        (crate::domain::Outcome::Yes, true) => &config.venue_b_no_token,
        (crate::domain::Outcome::No, true) => &config.venue_b_yes_token,
        (crate::domain::Outcome::Yes, false) => &config.venue_b_yes_token,
        (crate::domain::Outcome::No, false) => &config.venue_b_no_token,
    }
}

struct TaskExecutor {
    config: Arc<TaskConfig>,
    progress: Arc<RwLock<TaskProgress>>,
    cancel: CancellationToken,
    deps: Arc<ExecutorDeps>,
}

impl TaskExecutor {
    fn hedge_token(&self) -> &crate::domain::TokenId {
        hedge_token_for(&self.config)
    }

    fn set_status(&self, status: TaskStatus) {
        self.progress.write().status = status.clone();
        let _ = self.deps.events_tx.send(TaskChangeEvent {
            task_id: self.config.id.clone(),
            status,
        });
    }

    async fn log(&self, kind: &str, payload: serde_json::Value, priority: Priority) {
        self.deps
            .log_sink
            .log_event(self.config.id.clone(), kind, payload, priority)
            .await;
    }

    async fn run(self) {
        if self.cancel.is_cancelled() {
            return;
        }

        let drive = self.drive();
        tokio::pin!(drive);

        tokio::select! {
            _ = self.cancel.cancelled() => {
                self.teardown_on_cancel(CancelReason::ExternalCancel).await;
            }
            _ = &mut drive => {}
        }

        let summary = {
            let progress = self.progress.read();
            json!({
                "status": format!("{:?}", progress.status),
                "predict_filled_qty": progress.predict_filled_qty,
                "hedged_qty": progress.hedged_qty,
                "actual_profit": progress.actual_profit,
            })
        };
        self.deps.log_sink.write_summary(self.config.id.clone(), summary).await;
    }

    async fn drive(&self) {
        if let Err(reason) = self.validate_entry().await {
            self.set_status(TaskStatus::Failed { reason: reason.clone() });
            self.log("task_failed", json!({"reason": format!("{:?}", reason)}), Priority::Critical)
                .await;
            return;
        }

        let order = match self.submit_order().await {
            Ok(order) => order,
            Err(reason) => {
                self.set_status(TaskStatus::Failed { reason: reason.clone() });
                self.log("submit_failed", json!({"reason": format!("{:?}", reason)}), Priority::Critical)
                    .await;
                return;
            }
        };

        self.progress.write().active_order = Some(order.clone());
        self.set_status(TaskStatus::Submitted);
        self.deps.fills.track(&order.hash, self.config.target_qty);
        self.log("order_submitted", json!({"order_hash": order.hash}), Priority::Info).await;

        self.monitor(&order).await;
    }

    /// CREATED -> SUBMITTED validation: position check (SELL only), a
    /// retried fetch of both venues' top-of-book with a stored-reference
    /// fallback, price/quantity alignment, and the cost bound.
    async fn validate_entry(&self) -> Result<(), CancelReason> {
        self.progress.write().first_status_at = Some(Utc::now());

        if self.config.direction == Direction::Sell {
            let position = self
                .deps
                .gateway_b
                .get_position(self.hedge_token())
                .await
                .map_err(|_| CancelReason::PositionInsufficient)?;
            if position.shares < 0.99 * self.config.target_qty {
                return Err(CancelReason::PositionInsufficient);
            }
        }

        let (venue_a_price, venue_b_price) = self.fetch_entry_reference_prices().await;

        let predict_leg_raw = venue_a_price.unwrap_or(self.config.limit_price);
        let aligned_price = match self.config.direction {
            Direction::Buy => align_up(predict_leg_raw, self.config.tick_size),
            Direction::Sell => align_down(predict_leg_raw, self.config.tick_size),
        };
        let aligned_qty = align_qty(self.config.target_qty);

        let order_fee = fee(aligned_price, self.config.fee_bps);
        // For BUY, fall back to the stored acceptance bound when the live
        // hedge-side book never came back within the retry budget.
        let hedge_bound = match self.config.direction {
            Direction::Buy => venue_b_price.unwrap_or_else(|| self.config.max_hedge_price.unwrap_or(0.0)),
            Direction::Sell => 0.0,
        };

        if let Some(max_total) = self.config.max_total_cost {
            let total = aligned_price + hedge_bound + order_fee;
            if total > max_total + crate::application::guard::PRICE_EPSILON {
                return Err(CancelReason::CostInvalid);
            }
        }

        let order_value = aligned_price * aligned_qty;
        if order_value + crate::application::guard::PRICE_EPSILON < self.deps.executor_cfg.min_order_value_usd {
            return Err(CancelReason::PriceInvalid);
        }

        let mut progress = self.progress.write();
        progress.aligned_price = aligned_price;
        progress.aligned_qty = aligned_qty;
        drop(progress);

        Ok(())
    }

    /// Fetches Venue-A's predict-leg top-of-book and Venue-B's hedge-leg
    /// top-of-book, retrying up to [`ENTRY_FETCH_RETRIES`] times with
    /// [`ENTRY_FETCH_BACKOFF`] between attempts. Either side still missing
    /// after exhaustion is left `None`; callers fall back to the task's
    /// stored reference prices.
    async fn fetch_entry_reference_prices(&self) -> (Option<f64>, Option<f64>) {
        let hedge_token = self.hedge_token().clone();
        let mut venue_a_price = None;
        let mut venue_b_price = None;

        for attempt in 0..ENTRY_FETCH_RETRIES {
            if venue_a_price.is_none() {
                venue_a_price = self.fetch_venue_a_price().await;
            }
            if venue_b_price.is_none() {
                venue_b_price = self.estimate_hedge_price(&hedge_token).await;
            }
            if venue_a_price.is_some() && venue_b_price.is_some() {
                break;
            }
            if attempt + 1 < ENTRY_FETCH_RETRIES {
                tokio::time::sleep(ENTRY_FETCH_BACKOFF).await;
            }
        }
        (venue_a_price, venue_b_price)
    }

    /// Resolves the predict leg's Venue-A market to its outcome token and
    /// reads the side of the book this task would actually cross.
    async fn fetch_venue_a_price(&self) -> Option<f64> {
        let market = self
            .deps
            .gateway_a
            .get_market_info(&self.config.venue_a_market_id)
            .await
            .ok()?;
        let label = match self.config.outcome {
            crate::domain::Outcome::Yes => "Yes",
            crate::domain::Outcome::No => "No",
        };
        let token_id = market
            .outcomes
            .iter()
            .find(|o| o.outcome.eq_ignore_ascii_case(label))?
            .id
            .clone();
        let book = self
            .deps
            .gateway_a
            .get_orderbook(&crate::domain::TokenId(token_id))
            .await
            .ok()?;
        match self.config.direction {
            Direction::Buy => book.best_ask().map(|(p, _)| crate::domain::orderbook::micros_to_f64(p)),
            Direction::Sell => book.best_bid().map(|(p, _)| crate::domain::orderbook::micros_to_f64(p)),
        }
    }

    async fn submit_order(&self) -> Result<OrderRef, CancelReason> {
        let post_only = matches!(self.config.strategy, crate::domain::Strategy::Maker);
        let (price, size) = {
            let progress = self.progress.read();
            (progress.aligned_price, progress.aligned_qty)
        };

        for attempt in 0..3u32 {
            match self
                .deps
                .gateway_a
                .submit_order(
                    &self.config.venue_a_market_id,
                    self.config.outcome,
                    self.config.direction,
                    price,
                    size,
                    post_only,
                    self.config.neg_risk,
                )
                .await
            {
                Ok(order) => return Ok(order),
                Err(e) if e.is_retryable() && attempt < 2 => {
                    warn!(attempt, "venue-a order submission retrying: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => {
                    warn!("venue-a order submission failed: {}", e);
                    return Err(CancelReason::PriceInvalid);
                }
            }
        }
        Err(CancelReason::PriceInvalid)
    }

    /// SUBMITTED / PARTIALLY_FILLED fill-monitoring loop, plus the order
    /// timeout and cost-guard interrupt paths.
    async fn monitor(&self, order: &OrderRef) {
        let aligned_price = self.progress.read().aligned_price;
        let bound = GuardBound {
            direction: self.config.direction,
            max_hedge_price: self.config.max_hedge_price,
            min_hedge_price: self.config.min_hedge_price,
            max_total_cost: self.config.max_total_cost,
            predict_leg_cost: aligned_price,
            fee: fee(aligned_price, self.config.fee_bps),
        };
        let mut guard = CostGuard::new(bound, !self.config.sports_category);

        let hedge_token = self.hedge_token().clone();
        let deadline = Instant::now() + Duration::from_millis(self.config.order_timeout_ms);
        let mut accumulated_qty = 0.0f64;
        let poll_interval = Duration::from_millis(self.deps.executor_cfg.poll_interval_ms);

        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            if Instant::now() >= deadline {
                self.handle_timeout(order, accumulated_qty).await;
                return;
            }

            let report = match self.deps.gateway_a.poll_order_state(order).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("order status poll failed: {}", e);
                    tokio::time::sleep(poll_interval).await;
                    continue;
                }
            };

            let update = self.deps.fills.observe_rest(&order.hash, &report);
            if let Some(update) = update {
                if update.new_fill_delta > 0.0 {
                    let mut progress = self.progress.write();
                    let prior_qty = progress.predict_filled_qty;
                    progress.predict_avg_price =
                        weighted_avg(progress.predict_avg_price, prior_qty, report.avg_price, update.new_fill_delta);
                    progress.predict_filled_qty = update.total_filled;
                    if progress.first_fill_at.is_none() {
                        progress.first_fill_at = update.first_fill_timestamp;
                    }
                    drop(progress);
                    self.set_status(TaskStatus::PartiallyFilled);
                    self.log(
                        "partial_fill",
                        json!({"total_filled": update.total_filled, "delta": update.new_fill_delta}),
                        Priority::Info,
                    )
                    .await;

                    accumulated_qty += update.new_fill_delta;
                    let fully_filled = update.total_filled >= self.config.target_qty - f64::EPSILON;
                    let estimated_hedge_price = self.estimate_hedge_price(&hedge_token).await.unwrap_or(0.5);
                    let notional = accumulated_qty * estimated_hedge_price;

                    if fully_filled
                        || (accumulated_qty >= self.deps.executor_cfg.min_hedge_shares
                            && notional >= self.deps.executor_cfg.min_hedge_notional_usd)
                    {
                        self.set_status(TaskStatus::Hedging);
                        if self.incremental_hedge(&hedge_token, accumulated_qty).await {
                            accumulated_qty = 0.0;
                        }
                        if fully_filled {
                            self.finalize(order, &hedge_token).await;
                            return;
                        }
                        self.set_status(TaskStatus::PartiallyFilled);
                    }
                }

                if matches!(update.rest_state, Some(RestOrderState::Cancelled) | Some(RestOrderState::Expired)) {
                    self.finalize(order, &hedge_token).await;
                    return;
                }
            }

            let book = self.read_cached_book(&hedge_token).await;
            if let Some(book) = book {
                if let Some(GuardTransition::BecameInvalid) = guard.on_book_update(&book, Instant::now()) {
                    let held_order = self.progress.read().active_order.is_some();
                    if held_order {
                        self.cancel_and_end(order, CancelReason::CostInvalid, accumulated_qty, &hedge_token).await;
                        return;
                    }
                }
                if guard.is_depth_unstable() {
                    self.log("depth_unstable", json!({}), Priority::Info).await;
                }
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Reads the cache and, per its freshness classification, either returns
    /// the cached book outright (Fresh), kicks off a single-flight background
    /// refresh before returning the still-usable cached book (Stale/MaxStale),
    /// or performs a synchronous REST fetch (Missing).
    async fn read_cached_book(&self, token: &crate::domain::TokenId) -> Option<crate::domain::Orderbook> {
        let key = CacheKey::new(crate::domain::Venue::B, token.clone());
        let (book, status) = self.deps.cache.read(&key);
        match status {
            crate::infrastructure::CacheRead::Fresh => book,
            crate::infrastructure::CacheRead::Stale | crate::infrastructure::CacheRead::MaxStale => {
                self.spawn_background_refresh(key);
                book
            }
            crate::infrastructure::CacheRead::Missing => self.refresh_book(&key).await,
        }
    }

    /// Single-flight background refresh: only one in-flight refresh per key
    /// at a time, per the cache's own guard.
    fn spawn_background_refresh(&self, key: CacheKey) {
        if !self.deps.cache.try_begin_refresh(&key) {
            return;
        }
        let gateway_b = self.deps.gateway_b.clone();
        let cache = self.deps.cache.clone();
        tokio::spawn(async move {
            if let Ok(book) = gateway_b.get_orderbook(&key.token).await {
                cache.ingest_rest(key.clone(), book);
            }
            cache.finish_refresh(&key);
        });
    }

    /// Synchronous REST fetch used on a cache miss.
    async fn refresh_book(&self, key: &CacheKey) -> Option<crate::domain::Orderbook> {
        let book = self.deps.gateway_b.get_orderbook(&key.token).await.ok()?;
        self.deps.cache.ingest_rest(key.clone(), book.clone());
        Some(book)
    }

    async fn estimate_hedge_price(&self, token: &crate::domain::TokenId) -> Option<f64> {
        let book = self.read_cached_book(token).await?;
        match self.config.direction {
            Direction::Buy => book.best_ask().map(|(p, _)| crate::domain::orderbook::micros_to_f64(p)),
            Direction::Sell => book.best_bid().map(|(p, _)| crate::domain::orderbook::micros_to_f64(p)),
        }
    }

    /// Submits an IOC hedge for `qty` shares and credits the result.
    /// Returns true if the hedge order was accepted (not necessarily fully
    /// filled; fill accounting happens via the venue's reported status).
    async fn incremental_hedge(&self, token: &crate::domain::TokenId, qty: f64) -> bool {
        let side = match self.config.direction {
            Direction::Buy => ClobSide::Sell,
            Direction::Sell => ClobSide::Buy,
        };
        let price = match self.estimate_hedge_price(token).await {
            Some(p) => p,
            None => return false,
        };
        let bound_ok = match self.config.direction {
            Direction::Buy => self.config.max_hedge_price.map(|b| price <= b + crate::application::guard::PRICE_EPSILON).unwrap_or(true),
            Direction::Sell => self.config.min_hedge_price.map(|b| price >= b - crate::application::guard::PRICE_EPSILON).unwrap_or(true),
        };
        if !bound_ok {
            warn!("hedging outside acceptance bound to avoid naked exposure: price={}", price);
        }

        let size = (qty * 100.0).floor() / 100.0;
        if size <= 0.0 {
            return false;
        }
        match self.deps.gateway_b.hedge(token, side, price, size, self.config.neg_risk).await {
            Ok(resp) => {
                let mut progress = self.progress.write();
                let prior_qty = progress.hedged_qty;
                progress.hedge_avg_price = weighted_avg(progress.hedge_avg_price, prior_qty, price, size);
                progress.hedged_qty += size;
                if progress.first_hedge_fill_at.is_none() {
                    progress.first_hedge_fill_at = Some(Utc::now());
                }
                drop(progress);
                self.log("hedge_fill", json!({"qty": size, "price": price, "success": resp.success}), Priority::Info)
                    .await;
                true
            }
            Err(e) => {
                warn!("hedge order failed: {}", e);
                false
            }
        }
    }

    /// Order timeout path: force a fresh status read, cancel, hand off any
    /// partial fill to final hedging.
    async fn handle_timeout(&self, order: &OrderRef, accumulated: f64) {
        let hedge_token = self.hedge_token().clone();
        self.cancel_and_end(order, CancelReason::OrderTimeout, accumulated, &hedge_token).await;
    }

    async fn cancel_and_end(
        &self,
        order: &OrderRef,
        reason: CancelReason,
        accumulated: f64,
        hedge_token: &crate::domain::TokenId,
    ) {
        if let Ok(report) = self.deps.gateway_a.poll_order_state(order).await {
            if let Some(update) = self.deps.fills.observe_rest(&order.hash, &report) {
                self.progress.write().predict_filled_qty = update.total_filled;
            }
        }
        if let Err(e) = self.deps.gateway_a.cancel_order(order).await {
            warn!("cancel_order failed during cancel-and-end: {}", e);
        }
        let _ = self.deps.gateway_a.poll_order_state(order).await;

        let progress = self.progress.read();
        let filled = progress.predict_filled_qty;
        let hedged = progress.hedged_qty;
        drop(progress);

        let remaining = accumulated.max(filled - hedged);
        if remaining < MIN_HEDGE_THRESHOLD {
            self.progress.write().active_order = None;
            self.set_status(TaskStatus::Cancelled { reason });
            self.deps.fills.untrack(&order.hash);
            return;
        }

        self.final_hedge(order, remaining, hedge_token, reason).await;
    }

    /// Final hedging with bounded retries, falling through to loss-hedge on
    /// exhaustion.
    async fn final_hedge(&self, order: &OrderRef, mut remaining: f64, hedge_token: &crate::domain::TokenId, reason: CancelReason) {
        self.set_status(TaskStatus::Hedging);

        for attempt in 0..self.config.max_hedge_retries {
            if remaining < MIN_HEDGE_THRESHOLD {
                break;
            }
            self.progress.write().hedge_retry_count = attempt + 1;
            if self.incremental_hedge(hedge_token, remaining).await {
                let progress = self.progress.read();
                remaining = (progress.predict_filled_qty - progress.hedged_qty).max(0.0);
                drop(progress);
            }
            if remaining < MIN_HEDGE_THRESHOLD {
                break;
            }
            tokio::time::sleep(HEDGE_RETRY_SLEEP).await;
        }

        self.deps.fills.untrack(&order.hash);
        self.progress.write().active_order = None;

        if remaining < MIN_HEDGE_THRESHOLD {
            self.set_status(TaskStatus::Cancelled { reason });
            return;
        }

        self.loss_hedge(hedge_token, remaining).await;
    }

    /// Loss-hedge escape: widen the acceptance bound, poll up to a 30-minute
    /// budget, take the first acceptable top-of-book.
    async fn loss_hedge(&self, hedge_token: &crate::domain::TokenId, remaining: f64) {
        self.set_status(TaskStatus::LossHedge);
        let ceiling_mult = 1.0 + self.deps.executor_cfg.loss_hedge_max_deviation;
        let budget = Duration::from_millis(self.deps.executor_cfg.loss_hedge_max_wait_ms);
        let deadline = Instant::now() + budget;

        loop {
            if self.cancel.is_cancelled() || Instant::now() >= deadline {
                break;
            }
            let Some(price) = self.estimate_hedge_price(hedge_token).await else {
                tokio::time::sleep(LOSS_HEDGE_POLL_INTERVAL).await;
                continue;
            };
            let ceiling = self.config.max_hedge_price.map(|b| b * ceiling_mult);
            let acceptable = match self.config.direction {
                Direction::Buy => ceiling.map(|c| price <= c).unwrap_or(true),
                Direction::Sell => self.config.min_hedge_price.map(|b| price >= b / ceiling_mult).unwrap_or(true),
            };
            if !acceptable {
                tokio::time::sleep(LOSS_HEDGE_POLL_INTERVAL).await;
                continue;
            }
            if self.incremental_hedge(hedge_token, remaining).await {
                self.set_status(TaskStatus::Completed { loss_hedge: true });
                self.log("loss_hedge_completed", json!({"qty": remaining, "price": price}), Priority::Critical)
                    .await;
                return;
            }
            tokio::time::sleep(LOSS_HEDGE_POLL_INTERVAL).await;
        }

        self.set_status(TaskStatus::HedgeFailed);
        self.log("hedge_failed", json!({"remaining": remaining}), Priority::Critical).await;
    }

    /// Predict leg fully filled: hedge whatever remains unhedged, then mark
    /// the task COMPLETED.
    async fn finalize(&self, order: &OrderRef, hedge_token: &crate::domain::TokenId) {
        let progress = self.progress.read();
        let mut remaining = (progress.predict_filled_qty - progress.hedged_qty).max(0.0);
        drop(progress);

        let mut attempt = 0;
        while remaining >= MIN_HEDGE_THRESHOLD && attempt < self.config.max_hedge_retries {
            if self.incremental_hedge(hedge_token, remaining).await {
                let progress = self.progress.read();
                remaining = (progress.predict_filled_qty - progress.hedged_qty).max(0.0);
                drop(progress);
            }
            attempt += 1;
            if remaining >= MIN_HEDGE_THRESHOLD {
                tokio::time::sleep(HEDGE_RETRY_SLEEP).await;
            }
        }

        self.deps.fills.untrack(&order.hash);
        self.progress.write().active_order = None;

        if remaining >= MIN_HEDGE_THRESHOLD {
            self.loss_hedge(hedge_token, remaining).await;
            return;
        }

        let (predict_filled_qty, predict_cost, hedge_cost) = {
            let progress = self.progress.read();
            (
                progress.predict_filled_qty,
                progress.predict_avg_price * progress.predict_filled_qty,
                progress.hedge_avg_price * progress.hedged_qty,
            )
        };
        let actual_profit = match self.config.direction {
            Direction::Buy => predict_filled_qty - predict_cost - hedge_cost,
            Direction::Sell => predict_cost + hedge_cost,
        };
        {
            let mut progress = self.progress.write();
            progress.actual_profit = actual_profit;
            progress.completed_at = Some(Utc::now());
        }
        self.set_status(TaskStatus::Completed { loss_hedge: false });
        self.log("task_completed", json!({}), Priority::Critical).await;
    }

    /// External cancellation via the cancellation token: stop guard/timer
    /// (implicit — loop exits), cancel the resting order with a 5s budget,
    /// perform final-hedging for any partials, publish terminal state.
    async fn teardown_on_cancel(&self, reason: CancelReason) {
        let order = self.progress.read().active_order.clone();
        if let Some(order) = order {
            let hedge_token = self.hedge_token().clone();
            let cancel_result = tokio::time::timeout(Duration::from_secs(5), self.deps.gateway_a.cancel_order(&order)).await;
            if cancel_result.is_err() {
                warn!("order cancel timed out during teardown");
            }
            let accumulated = self.progress.read().predict_filled_qty - self.progress.read().hedged_qty;
            if accumulated >= MIN_HEDGE_THRESHOLD {
                self.final_hedge(&order, accumulated, &hedge_token, reason.clone()).await;
                return;
            }
        }
        self.set_status(TaskStatus::Cancelled { reason });
        self.log("task_cancelled", json!({}), Priority::Critical).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_is_halved_by_rebate() {
        let f = fee(0.5, 200); // 2% fee on the cheaper side of a 0.5/0.5 market
        assert!((f - 0.5 * 0.02 * 0.9).abs() < 1e-9);
    }

    #[test]
    fn fee_uses_min_of_price_and_complement() {
        let f_low = fee(0.2, 100);
        let f_high = fee(0.8, 100);
        assert!((f_low - f_high).abs() < 1e-9);
    }

    fn sample_config(outcome: crate::domain::Outcome, inverted: bool) -> TaskConfig {
        TaskConfig {
            id: TaskId("t1".to_string()),
            direction: Direction::Buy,
            outcome,
            venue_a_market_id: "market-1".to_string(),
            venue_b_yes_token: crate::domain::TokenId("yes-token".to_string()),
            venue_b_no_token: crate::domain::TokenId("no-token".to_string()),
            inverted,
            limit_price: 0.4,
            max_hedge_price: Some(0.55),
            min_hedge_price: None,
            target_qty: 100.0,
            fee_bps: 200,
            tick_size: 0.01,
            neg_risk: false,
            strategy: crate::domain::Strategy::Taker,
            max_total_cost: Some(0.98),
            order_timeout_ms: 20_000,
            max_hedge_retries: 3,
            sports_category: false,
        }
    }

    #[test]
    fn hedge_token_is_opposite_outcome_when_not_inverted() {
        let cfg = sample_config(crate::domain::Outcome::Yes, false);
        assert_eq!(hedge_token_for(&cfg).0, "no-token");

        let cfg = sample_config(crate::domain::Outcome::No, false);
        assert_eq!(hedge_token_for(&cfg).0, "yes-token");
    }

    #[test]
    fn hedge_token_is_same_outcome_when_inverted() {
        let cfg = sample_config(crate::domain::Outcome::Yes, true);
        assert_eq!(hedge_token_for(&cfg).0, "yes-token");

        let cfg = sample_config(crate::domain::Outcome::No, true);
        assert_eq!(hedge_token_for(&cfg).0, "no-token");
    }
}
