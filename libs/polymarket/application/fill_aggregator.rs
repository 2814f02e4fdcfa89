//! Fill Aggregator: per-order merged view of fill progress from two
//! independent sources (REST poll + block-event/user-channel trade).
//!
//! Generalizes `OrderStateStore::process_trade`'s trade-id dedup table down
//! to a single order's two-source merge: `totalFilled` is always
//! `max(restFilled, eventFilled)`, clamped to `orderQty`, and is monotone
//! non-decreasing by construction (a dedup'd event only ever adds to
//! `eventFilled`; a REST read only ever replaces `restFilled` with a fresher
//! scalar, never rewinds it below what's already been observed).

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::{FillEvent, RestFillReport, RestOrderState};

/// Bound on the event dedup set per order, mirroring the teacher's
/// `seen_trade_ids`/`seen_trade_ids_order` bounded VecDeque so a
/// long-lived order's dedup table doesn't grow unbounded.
const MAX_SEEN_EVENTS: usize = 2_048;

#[derive(Debug, Clone)]
pub struct FillUpdate {
    pub total_filled: f64,
    pub new_fill_delta: f64,
    pub is_complete: bool,
    pub first_fill_timestamp: Option<DateTime<Utc>>,
    pub rest_state: Option<RestOrderState>,
}

struct Entry {
    order_qty: f64,
    event_filled: f64,
    rest_filled: f64,
    rest_state: Option<RestOrderState>,
    seen_keys: HashSet<String>,
    seen_order: VecDeque<String>,
    prev_total: f64,
    first_fill_timestamp: Option<DateTime<Utc>>,
}

impl Entry {
    fn new(order_qty: f64) -> Self {
        Self {
            order_qty,
            event_filled: 0.0,
            rest_filled: 0.0,
            rest_state: None,
            seen_keys: HashSet::new(),
            seen_order: VecDeque::new(),
            prev_total: 0.0,
            first_fill_timestamp: None,
        }
    }

    fn remember(&mut self, key: String) -> bool {
        if self.seen_keys.contains(&key) {
            return false;
        }
        if self.seen_order.len() >= MAX_SEEN_EVENTS {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen_keys.remove(&oldest);
            }
        }
        self.seen_order.push_back(key.clone());
        self.seen_keys.insert(key);
        true
    }

    fn snapshot(&mut self, event_timestamp: Option<DateTime<Utc>>) -> FillUpdate {
        let total_filled = self.event_filled.max(self.rest_filled).min(self.order_qty);
        let new_fill_delta = (total_filled - self.prev_total).max(0.0);
        if new_fill_delta > 0.0 && self.first_fill_timestamp.is_none() {
            self.first_fill_timestamp = Some(event_timestamp.unwrap_or_else(Utc::now));
        }
        self.prev_total = total_filled;

        // Cancelled/Expired are themselves the "venue has explicitly terminated
        // the order" case; Filled additionally requires the quantities agree.
        let is_complete = match self.rest_state {
            Some(RestOrderState::Filled) => total_filled >= self.order_qty - f64::EPSILON,
            Some(RestOrderState::Cancelled) | Some(RestOrderState::Expired) => true,
            _ => false,
        };

        FillUpdate {
            total_filled,
            new_fill_delta,
            is_complete,
            first_fill_timestamp: self.first_fill_timestamp,
            rest_state: self.rest_state,
        }
    }
}

/// Process-wide table of per-order aggregation state, one entry per
/// currently-tracked order hash.
pub struct FillAggregator {
    entries: RwLock<HashMap<String, Entry>>,
}

impl FillAggregator {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a new order for tracking. No-op if already tracked (a
    /// resubmitted order after a cancel-and-replace gets a fresh hash and so
    /// a fresh entry).
    pub fn track(&self, order_hash: &str, order_qty: f64) {
        self.entries
            .write()
            .entry(order_hash.to_string())
            .or_insert_with(|| Entry::new(order_qty));
    }

    pub fn untrack(&self, order_hash: &str) {
        self.entries.write().remove(order_hash);
    }

    /// Folds a dedup'd block-event/user-channel fill into the order's
    /// aggregate. Returns `None` if the order isn't tracked or the event was
    /// a duplicate.
    pub fn observe_event(&self, order_hash: &str, event: &FillEvent) -> Option<FillUpdate> {
        let mut guard = self.entries.write();
        let entry = guard.get_mut(order_hash)?;
        if !entry.remember(event.dedup_key()) {
            return None;
        }
        entry.event_filled += event.taker_amount_filled;
        Some(entry.snapshot(Some(event.timestamp)))
    }

    /// Folds a REST status observation into the order's aggregate. REST is
    /// authoritative for cumulative filled quantity and order status;
    /// `rest_filled` only ever moves forward because `filled_qty` itself is
    /// cumulative at the source.
    pub fn observe_rest(&self, order_hash: &str, report: &RestFillReport) -> Option<FillUpdate> {
        let mut guard = self.entries.write();
        let entry = guard.get_mut(order_hash)?;
        entry.rest_filled = entry.rest_filled.max(report.filled_qty);
        entry.rest_state = Some(report.state);
        Some(entry.snapshot(Some(report.report_timestamp)))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for FillAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(tx: &str, log_index: u64, taker_amt: f64) -> FillEvent {
        FillEvent {
            order_hash: "order-1".to_string(),
            maker: "maker".to_string(),
            taker: "taker".to_string(),
            maker_amount_filled: taker_amt,
            taker_amount_filled: taker_amt,
            fee: 0.0,
            block_number: 1,
            tx_hash: tx.to_string(),
            log_index,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn rest(filled: f64, state: RestOrderState) -> RestFillReport {
        RestFillReport {
            state,
            filled_qty: filled,
            remaining_qty: (10.0 - filled).max(0.0),
            avg_price: 0.5,
            cancel_reason: None,
            report_timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 1).unwrap(),
        }
    }

    #[test]
    fn monotone_across_event_and_rest_sources() {
        let agg = FillAggregator::new();
        agg.track("order-1", 10.0);

        let u1 = agg.observe_event("order-1", &event("0xabc", 0, 3.0)).unwrap();
        assert_eq!(u1.total_filled, 3.0);
        assert_eq!(u1.new_fill_delta, 3.0);
        assert!(u1.first_fill_timestamp.is_some());

        let u2 = agg.observe_rest("order-1", &rest(5.0, RestOrderState::PartiallyFilled)).unwrap();
        assert_eq!(u2.total_filled, 5.0);
        assert_eq!(u2.new_fill_delta, 2.0);

        // Stale REST read below the already-observed total must not rewind it.
        let u3 = agg.observe_rest("order-1", &rest(4.0, RestOrderState::PartiallyFilled)).unwrap();
        assert_eq!(u3.total_filled, 5.0);
        assert_eq!(u3.new_fill_delta, 0.0);
    }

    #[test]
    fn duplicate_event_is_idempotent() {
        let agg = FillAggregator::new();
        agg.track("order-1", 10.0);
        agg.observe_event("order-1", &event("0xabc", 0, 4.0)).unwrap();
        let dup = agg.observe_event("order-1", &event("0xabc", 0, 4.0));
        assert!(dup.is_none());
    }

    #[test]
    fn total_filled_never_exceeds_order_qty() {
        let agg = FillAggregator::new();
        agg.track("order-1", 5.0);
        agg.observe_event("order-1", &event("0xabc", 0, 3.0));
        let u = agg.observe_event("order-1", &event("0xdef", 1, 10.0)).unwrap();
        assert_eq!(u.total_filled, 5.0);
    }

    #[test]
    fn completes_on_filled_status_at_full_quantity() {
        let agg = FillAggregator::new();
        agg.track("order-1", 10.0);
        agg.observe_event("order-1", &event("0xabc", 0, 10.0));
        let u = agg.observe_rest("order-1", &rest(10.0, RestOrderState::Filled)).unwrap();
        assert!(u.is_complete);
    }

    #[test]
    fn untracked_order_observations_are_ignored() {
        let agg = FillAggregator::new();
        assert!(agg.observe_event("ghost", &event("0xabc", 0, 1.0)).is_none());
    }
}
