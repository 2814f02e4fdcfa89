//! Cost/Price Guard: an event-driven predicate re-evaluated on every
//! Venue-B orderbook update for a task's hedge token.
//!
//! Generalizes `TakerTask::check_and_execute`'s one-shot
//! `combined_avg >= max_combined_avg` skip check and its `PRICE_EPSILON`
//! comparisons into a standing, latched guard object with hysteresis, a
//! per-instance evaluation throttle, and a ghost-depth detector.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::domain::orderbook::micros_to_f64;
use crate::domain::{Direction, Orderbook};

/// Epsilon tolerance applied to every price/cost comparison so that
/// float/micros rounding never flips a borderline-valid opportunity.
pub const PRICE_EPSILON: f64 = 1e-4;

/// Evaluations are throttled to at most one per this interval per guard
/// instance, so bursty book churn doesn't spend CPU re-evaluating.
const THROTTLE: Duration = Duration::from_millis(200);

/// Ghost-depth detector window and flip threshold.
const GHOST_WINDOW: Duration = Duration::from_secs(30);
const GHOST_FLIP_THRESHOLD: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Valid,
    Invalid,
}

/// The price/cost bound a guard instance enforces, derived once from the
/// task's immutable config.
#[derive(Debug, Clone, Copy)]
pub struct GuardBound {
    pub direction: Direction,
    pub max_hedge_price: Option<f64>,
    pub min_hedge_price: Option<f64>,
    pub max_total_cost: Option<f64>,
    pub predict_leg_cost: f64,
    pub fee: f64,
}

impl GuardBound {
    fn evaluate(&self, hedge_best_ask: Option<f64>, hedge_best_bid: Option<f64>) -> bool {
        match self.direction {
            Direction::Buy => {
                let Some(ask) = hedge_best_ask else { return false };
                let price_ok = self
                    .max_hedge_price
                    .map(|bound| ask <= bound + PRICE_EPSILON)
                    .unwrap_or(true);
                let cost_ok = self
                    .max_total_cost
                    .map(|bound| self.predict_leg_cost + ask + self.fee <= bound + PRICE_EPSILON)
                    .unwrap_or(true);
                price_ok && cost_ok
            }
            Direction::Sell => {
                let Some(bid) = hedge_best_bid else { return false };
                self.min_hedge_price
                    .map(|bound| bid >= bound - PRICE_EPSILON)
                    .unwrap_or(true)
            }
        }
    }

    fn acceptance_range_micros(&self) -> Option<(u64, u64, bool)> {
        match self.direction {
            Direction::Buy => self
                .max_hedge_price
                .map(|bound| (0u64, (bound * 1_000_000.0) as u64, false)),
            Direction::Sell => self
                .min_hedge_price
                .map(|bound| ((bound * 1_000_000.0) as u64, u64::MAX, true)),
        }
    }
}

/// One instance per active task, owned by that task's executor.
pub struct CostGuard {
    bound: GuardBound,
    state: GuardState,
    last_eval: Option<Instant>,
    ghost_detection: bool,
    depth_flips: VecDeque<(Instant, bool)>,
    last_depth_present: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardTransition {
    None,
    BecameValid,
    BecameInvalid,
}

impl CostGuard {
    pub fn new(bound: GuardBound, ghost_detection: bool) -> Self {
        Self {
            bound,
            state: GuardState::Valid,
            last_eval: None,
            ghost_detection,
            depth_flips: VecDeque::new(),
            last_depth_present: None,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    /// Re-evaluates against a fresh Venue-B book. Returns `None` if the
    /// per-instance throttle window hasn't elapsed (caller should keep its
    /// previous state); otherwise returns the edge (if any).
    pub fn on_book_update(&mut self, book: &Orderbook, now: Instant) -> Option<GuardTransition> {
        if let Some(last) = self.last_eval {
            if now.duration_since(last) < THROTTLE {
                return None;
            }
        }
        self.last_eval = Some(now);

        let ask = book.best_ask().map(|(p, _)| micros_to_f64(p));
        let bid = book.best_bid().map(|(p, _)| micros_to_f64(p));
        let valid = self.bound.evaluate(ask, bid);

        if self.ghost_detection {
            self.track_ghost_depth(book, now);
        }

        let new_state = if valid { GuardState::Valid } else { GuardState::Invalid };
        let transition = match (self.state, new_state) {
            (GuardState::Invalid, GuardState::Valid) => GuardTransition::BecameValid,
            (GuardState::Valid, GuardState::Invalid) => GuardTransition::BecameInvalid,
            _ => GuardTransition::None,
        };
        self.state = new_state;
        Some(transition)
    }

    /// Degraded polling path used when Venue-B's WS connection is down.
    /// Bypasses the throttle since polling already rate-limits itself.
    pub fn on_poll(&mut self, book: &Orderbook) -> GuardTransition {
        let ask = book.best_ask().map(|(p, _)| micros_to_f64(p));
        let bid = book.best_bid().map(|(p, _)| micros_to_f64(p));
        let valid = self.bound.evaluate(ask, bid);
        let new_state = if valid { GuardState::Valid } else { GuardState::Invalid };
        let transition = match (self.state, new_state) {
            (GuardState::Invalid, GuardState::Valid) => GuardTransition::BecameValid,
            (GuardState::Valid, GuardState::Invalid) => GuardTransition::BecameInvalid,
            _ => GuardTransition::None,
        };
        self.state = new_state;
        transition
    }

    fn track_ghost_depth(&mut self, book: &Orderbook, now: Instant) {
        let Some((low, high, side_is_bid)) = self.bound.acceptance_range_micros() else {
            return;
        };
        let depth = book.executable_depth(side_is_bid, low, high);
        let present = depth > 0;

        while let Some((ts, _)) = self.depth_flips.front() {
            if now.duration_since(*ts) > GHOST_WINDOW {
                self.depth_flips.pop_front();
            } else {
                break;
            }
        }

        if self.last_depth_present != Some(present) {
            self.depth_flips.push_back((now, present));
        }
        self.last_depth_present = Some(present);
    }

    /// True once the ghost-depth detector has seen more than
    /// [`GHOST_FLIP_THRESHOLD`] flips within the rolling window.
    pub fn is_depth_unstable(&self) -> bool {
        self.depth_flips.len() >= GHOST_FLIP_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book_with(bid: Option<&str>, ask: Option<&str>) -> Orderbook {
        use crate::domain::orderbook::PriceLevel;
        let mut ob = Orderbook::new("token".to_string());
        let bids = bid
            .map(|p| vec![PriceLevel { price: p.to_string(), size: "100".to_string() }])
            .unwrap_or_default();
        let asks = ask
            .map(|p| vec![PriceLevel { price: p.to_string(), size: "100".to_string() }])
            .unwrap_or_default();
        ob.process_snapshot(&bids, &asks);
        ob
    }

    fn buy_bound(max_hedge: f64, max_total: f64, predict_leg: f64, fee: f64) -> GuardBound {
        GuardBound {
            direction: Direction::Buy,
            max_hedge_price: Some(max_hedge),
            min_hedge_price: None,
            max_total_cost: Some(max_total),
            predict_leg_cost: predict_leg,
            fee,
        }
    }

    #[test]
    fn buy_transitions_to_invalid_when_ask_exceeds_bound() {
        let mut guard = CostGuard::new(buy_bound(0.60, 0.95, 0.30, 0.01), false);
        let t0 = Instant::now();
        let ok = book_with(Some("0.10"), Some("0.55"));
        assert_eq!(guard.on_book_update(&ok, t0), Some(GuardTransition::None));
        assert_eq!(guard.state(), GuardState::Valid);

        let too_expensive = book_with(Some("0.10"), Some("0.70"));
        let t1 = t0 + Duration::from_millis(250);
        assert_eq!(guard.on_book_update(&too_expensive, t1), Some(GuardTransition::BecameInvalid));
        assert_eq!(guard.state(), GuardState::Invalid);
    }

    #[test]
    fn throttle_suppresses_rapid_reevaluation() {
        let mut guard = CostGuard::new(buy_bound(0.60, 0.95, 0.30, 0.01), false);
        let t0 = Instant::now();
        let ok = book_with(Some("0.10"), Some("0.55"));
        assert!(guard.on_book_update(&ok, t0).is_some());

        let too_expensive = book_with(Some("0.10"), Some("0.70"));
        let t1 = t0 + Duration::from_millis(50);
        assert_eq!(guard.on_book_update(&too_expensive, t1), None);
        assert_eq!(guard.state(), GuardState::Valid);
    }

    #[test]
    fn sell_predicate_uses_best_bid() {
        let bound = GuardBound {
            direction: Direction::Sell,
            max_hedge_price: None,
            min_hedge_price: Some(0.40),
            max_total_cost: None,
            predict_leg_cost: 0.0,
            fee: 0.0,
        };
        let mut guard = CostGuard::new(bound, false);
        let t0 = Instant::now();
        let low_bid = book_with(Some("0.30"), Some("0.50"));
        assert_eq!(guard.on_book_update(&low_bid, t0), Some(GuardTransition::None));
        assert_eq!(guard.state(), GuardState::Invalid);
    }

    #[test]
    fn ghost_depth_flags_after_repeated_flips() {
        let mut guard = CostGuard::new(buy_bound(0.60, 0.95, 0.30, 0.01), true);
        let mut t = Instant::now();
        let present = book_with(Some("0.10"), Some("0.55"));
        let absent = book_with(Some("0.10"), None);
        for i in 0..8 {
            let book = if i % 2 == 0 { &present } else { &absent };
            guard.on_book_update(book, t);
            t += Duration::from_millis(250);
        }
        assert!(guard.is_depth_unstable());
    }
}
