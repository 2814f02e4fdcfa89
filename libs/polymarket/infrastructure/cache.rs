//! Orderbook cache
//!
//! Merges Venue-B WebSocket book updates and Venue-A/B REST snapshots into a
//! single staleness-aware read surface. Once a key has seen a WS update it
//! moves into `wsOnly` mode: REST writes for that key are dropped, since a
//! live WS feed is always more current than a subsequent poll.

use crate::config::OrderbookCacheConfig;
use crate::domain::{Orderbook, TokenId, Venue};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct CacheKey {
    pub venue: Venue,
    pub token: TokenId,
}

impl CacheKey {
    pub fn new(venue: Venue, token: TokenId) -> Self {
        Self { venue, token }
    }
}

/// Freshness classification returned alongside a cached book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheRead {
    Fresh,
    Stale,
    /// Still usable, but callers should treat size/price as a lower bound
    /// and prefer refusing new orders rather than trusting it for sizing.
    MaxStale,
    /// No entry, or the entry exceeded `max_stale_ms` and was evicted on read.
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Rest,
    Ws,
}

struct Entry {
    book: Orderbook,
    updated_at: Instant,
    source: Source,
}

/// Shared orderbook cache. Cheap to clone behind an `Arc` at call sites.
pub struct OrderbookCache {
    fresh: Duration,
    stale: Duration,
    max_stale: Duration,
    entries: RwLock<HashMap<CacheKey, Entry>>,
    in_flight: Mutex<HashSet<CacheKey>>,
}

impl OrderbookCache {
    pub fn new(fresh_ms: u64, stale_ms: u64, max_stale_ms: u64) -> Self {
        Self {
            fresh: Duration::from_millis(fresh_ms),
            stale: Duration::from_millis(stale_ms),
            max_stale: Duration::from_millis(max_stale_ms),
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn from_config(cfg: &OrderbookCacheConfig) -> Self {
        Self::new(cfg.fresh_ms, cfg.stale_ms, cfg.max_stale_ms)
    }

    /// Ingest a REST poll result. Dropped if a WS feed already owns this key.
    pub fn ingest_rest(&self, key: CacheKey, book: Orderbook) {
        if book.is_crossed() {
            warn!(venue = %key.venue, token = %key.token, "rejecting crossed REST orderbook snapshot");
            return;
        }
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&key) {
            if existing.source == Source::Ws {
                return;
            }
        }
        entries.insert(
            key,
            Entry {
                book,
                updated_at: Instant::now(),
                source: Source::Rest,
            },
        );
    }

    /// Ingest a WebSocket book update. Always wins over REST for this key.
    pub fn ingest_ws(&self, key: CacheKey, book: Orderbook) {
        if book.is_crossed() {
            warn!(venue = %key.venue, token = %key.token, "rejecting crossed WS orderbook update");
            return;
        }
        self.entries.write().insert(
            key,
            Entry {
                book,
                updated_at: Instant::now(),
                source: Source::Ws,
            },
        );
    }

    /// True once a WS feed has written this key at least once.
    pub fn is_ws_only(&self, key: &CacheKey) -> bool {
        self.entries
            .read()
            .get(key)
            .map(|e| e.source == Source::Ws)
            .unwrap_or(false)
    }

    pub fn read(&self, key: &CacheKey) -> (Option<Orderbook>, CacheRead) {
        let entries = self.entries.read();
        match entries.get(key) {
            None => (None, CacheRead::Missing),
            Some(entry) => {
                let age = entry.updated_at.elapsed();
                if age <= self.fresh {
                    (Some(entry.book.clone()), CacheRead::Fresh)
                } else if age <= self.stale {
                    (Some(entry.book.clone()), CacheRead::Stale)
                } else if age <= self.max_stale {
                    (Some(entry.book.clone()), CacheRead::MaxStale)
                } else {
                    (None, CacheRead::Missing)
                }
            }
        }
    }

    /// Single-flight refresh guard. Returns `true` if the caller won the
    /// race and should perform the REST refresh, `false` if another task
    /// already owns an in-flight refresh for this key. Callers that win
    /// must call `finish_refresh` when done, success or failure.
    pub fn try_begin_refresh(&self, key: &CacheKey) -> bool {
        self.in_flight.lock().insert(key.clone())
    }

    pub fn finish_refresh(&self, key: &CacheKey) {
        self.in_flight.lock().remove(key);
    }

    pub fn remove(&self, key: &CacheKey) {
        self.entries.write().remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::orderbook::PriceLevel;

    fn level(price: &str, size: &str) -> PriceLevel {
        PriceLevel {
            price: price.to_string(),
            size: size.to_string(),
        }
    }

    fn book(asset: &str) -> Orderbook {
        let mut ob = Orderbook::new(asset.to_string());
        ob.process_snapshot(&[level("0.40", "100")], &[level("0.45", "100")]);
        ob
    }

    #[test]
    fn rest_then_ws_promotes_to_ws_only() {
        let cache = OrderbookCache::new(50, 100, 200);
        let key = CacheKey::new(Venue::B, TokenId("yes".into()));
        cache.ingest_rest(key.clone(), book("yes"));
        assert!(!cache.is_ws_only(&key));
        cache.ingest_ws(key.clone(), book("yes"));
        assert!(cache.is_ws_only(&key));
    }

    #[test]
    fn rest_write_dropped_once_ws_only() {
        let cache = OrderbookCache::new(50, 100, 200);
        let key = CacheKey::new(Venue::B, TokenId("yes".into()));
        cache.ingest_ws(key.clone(), book("yes"));
        let mut stale_book = book("yes");
        stale_book.process_update("BUY", "0.10", "999");
        cache.ingest_rest(key.clone(), stale_book);
        let (_, status) = cache.read(&key);
        assert_eq!(status, CacheRead::Fresh);
        assert!(cache.is_ws_only(&key));
    }

    #[test]
    fn crossed_book_rejected() {
        let cache = OrderbookCache::new(50, 100, 200);
        let key = CacheKey::new(Venue::A, TokenId("yes".into()));
        let mut crossed = Orderbook::new("yes".to_string());
        crossed.process_snapshot(&[level("0.60", "10")], &[level("0.55", "10")]);
        cache.ingest_rest(key.clone(), crossed);
        assert_eq!(cache.read(&key).1, CacheRead::Missing);
    }

    #[test]
    fn single_flight_refresh_guard() {
        let cache = OrderbookCache::new(50, 100, 200);
        let key = CacheKey::new(Venue::B, TokenId("yes".into()));
        assert!(cache.try_begin_refresh(&key));
        assert!(!cache.try_begin_refresh(&key));
        cache.finish_refresh(&key);
        assert!(cache.try_begin_refresh(&key));
    }
}
