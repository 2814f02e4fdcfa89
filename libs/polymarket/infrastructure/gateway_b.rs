//! Venue-B gateway: low-latency market-data WS plus REST order submission
//! for hedge legs.
//!
//! The book stream is a single multiplexed WS connection shared by every
//! task that needs a given token's book (many-to-many subscribe/unsubscribe
//! via reference counting), pushing updates straight into the
//! [`OrderbookCache`]. This generalizes the orderbook-tracking half of the
//! market tracker: same router/handler/builder shape, but it writes into
//! the shared cache instead of logging a best-ask-is-1 detector, and it
//! supports adding/removing tokens after the connection is already up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use hypersockets::core::*;
use hypersockets::{ClientEvent, MessageHandler, MessageRouter, WebSocketClientBuilder, WsMessage};
use parking_lot::RwLock as PLRwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::VenueBConfig;
use crate::domain::orderbook::PriceLevel;
use crate::domain::{TokenId, Venue};
use crate::infrastructure::cache::{CacheKey, OrderbookCache};
use crate::infrastructure::client::clob::{RestError, TradingClient, TradingError};
use crate::infrastructure::error::{ErrorClass, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum GatewayBError {
    #[error("venue-b transport error: {0}")]
    Transport(#[from] TradingError),

    #[error("venue-b rest error: {0}")]
    Rest(#[from] RestError),

    #[error("venue-b rejected the hedge order: {0}")]
    Rejected(String),

    #[error("venue-b market data stream unavailable: {0}")]
    Stream(String),
}

impl ErrorClass for GatewayBError {
    fn kind(&self) -> ErrorKind {
        match self {
            GatewayBError::Transport(_) | GatewayBError::Rest(_) => ErrorKind::Transient,
            GatewayBError::Rejected(_) => ErrorKind::RejectedByVenue,
            GatewayBError::Stream(_) => ErrorKind::Fatal,
        }
    }
}

// Wire types for the market-data channel. Mirrors Polymarket's public market
// WS: a `book` snapshot array on (re)subscribe, then incremental
// `price_change`/`tick_size_change` events per asset.
#[derive(Debug, Clone, Deserialize)]
struct BookSnapshot {
    event_type: String,
    asset_id: String,
    #[serde(default)]
    bids: Vec<PriceLevel>,
    #[serde(default)]
    asks: Vec<PriceLevel>,
}

#[derive(Debug, Clone, Deserialize)]
struct PriceChange {
    asset_id: String,
    side: String,
    price: String,
    size: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PriceChangeEvent {
    event_type: String,
    #[serde(default)]
    price_changes: Vec<PriceChange>,
}

#[derive(Debug, Clone, Deserialize)]
struct TickSizeChangeEvent {
    event_type: String,
    asset_id: String,
    new_tick_size: String,
}

#[derive(Debug, Clone)]
enum BookMessage {
    Snapshot(Vec<BookSnapshot>),
    PriceChange(PriceChangeEvent),
    TickSizeChange(TickSizeChangeEvent),
    Pong,
    Unknown,
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
enum BookRoute {
    Market,
}

struct BookRouter;

#[async_trait::async_trait]
impl MessageRouter for BookRouter {
    type Message = BookMessage;
    type RouteKey = BookRoute;

    async fn parse(&self, message: WsMessage) -> hypersockets::Result<Self::Message> {
        let text = match message.as_text() {
            Some(t) => t,
            None => return Ok(BookMessage::Unknown),
        };
        if text == "PONG" {
            return Ok(BookMessage::Pong);
        }
        if let Ok(snapshots) = serde_json::from_str::<Vec<BookSnapshot>>(text) {
            if snapshots.first().map(|s| s.event_type.as_str()) == Some("book") {
                return Ok(BookMessage::Snapshot(snapshots));
            }
        }
        if let Ok(event) = serde_json::from_str::<PriceChangeEvent>(text) {
            if event.event_type == "price_change" {
                return Ok(BookMessage::PriceChange(event));
            }
        }
        if let Ok(event) = serde_json::from_str::<TickSizeChangeEvent>(text) {
            if event.event_type == "tick_size_change" {
                return Ok(BookMessage::TickSizeChange(event));
            }
        }
        debug!("venue-b market stream: unrecognized message");
        Ok(BookMessage::Unknown)
    }

    fn route_key(&self, _message: &Self::Message) -> Self::RouteKey {
        BookRoute::Market
    }
}

struct BookHandler {
    cache: Arc<OrderbookCache>,
    tick_sizes: Arc<PLRwLock<HashMap<String, String>>>,
}

impl BookHandler {
    fn key(&self, token: &str) -> CacheKey {
        CacheKey::new(Venue::B, TokenId(token.to_string()))
    }

    fn handle_snapshot(&mut self, snapshots: &[BookSnapshot]) {
        for snapshot in snapshots {
            let mut ob = crate::domain::Orderbook::new(snapshot.asset_id.clone());
            ob.process_snapshot(&snapshot.bids, &snapshot.asks);
            self.cache.ingest_ws(self.key(&snapshot.asset_id), ob);
        }
    }

    fn handle_price_change(&mut self, event: &PriceChangeEvent) {
        for change in &event.price_changes {
            let key = self.key(&change.asset_id);
            let (existing, _) = self.cache.read(&key);
            let mut ob = existing.unwrap_or_else(|| crate::domain::Orderbook::new(change.asset_id.clone()));
            ob.process_update(&change.side, &change.price, &change.size);
            self.cache.ingest_ws(key, ob);
        }
    }

    fn handle_tick_size_change(&mut self, event: &TickSizeChangeEvent) {
        self.tick_sizes
            .write()
            .insert(event.asset_id.clone(), event.new_tick_size.clone());
    }
}

impl MessageHandler<BookMessage> for BookHandler {
    fn handle(&mut self, message: BookMessage) -> hypersockets::Result<()> {
        match message {
            BookMessage::Snapshot(s) => self.handle_snapshot(&s),
            BookMessage::PriceChange(e) => self.handle_price_change(&e),
            BookMessage::TickSizeChange(e) => self.handle_tick_size_change(&e),
            BookMessage::Pong | BookMessage::Unknown => {}
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct MarketSubscription {
    #[serde(rename = "type")]
    msg_type: String,
    assets_ids: Vec<String>,
}

impl MarketSubscription {
    fn new(ids: Vec<String>) -> Self {
        Self {
            msg_type: "market".to_string(),
            assets_ids: ids,
        }
    }
}

/// Venue-B gateway. Owns one multiplexed market-data connection and the
/// `TradingClient` used for IOC hedge submission.
pub struct GatewayB {
    trading: TradingClient,
    cache: Arc<OrderbookCache>,
    refcounts: DashMap<TokenId, usize>,
    client: hypersockets::WebSocketClient<BookRouter, BookMessage>,
    shutdown: Arc<AtomicBool>,
}

impl GatewayB {
    pub async fn connect(
        cfg: &VenueBConfig,
        private_key: &str,
        cache: Arc<OrderbookCache>,
    ) -> Result<Self, GatewayBError> {
        let trading = TradingClient::new(private_key, None, &cfg.rest_url, None).await?;

        let shutdown = Arc::new(AtomicBool::new(true));
        let handler = BookHandler {
            cache: cache.clone(),
            tick_sizes: Arc::new(PLRwLock::new(HashMap::new())),
        };
        let router = BookRouter;
        let client = WebSocketClientBuilder::new()
            .url(cfg.ws_url.clone())
            .router(router, move |routing| routing.handler(BookRoute::Market, handler))
            .heartbeat(Duration::from_secs(10), WsMessage::Text("PING".to_string()))
            .shutdown_flag(shutdown.clone())
            .build()
            .await
            .map_err(|e| GatewayBError::Stream(e.to_string()))?;

        Ok(Self {
            trading,
            cache,
            refcounts: DashMap::new(),
            client,
            shutdown,
        })
    }

    fn resubscribe(&self) -> Result<(), GatewayBError> {
        let ids: Vec<String> = self.refcounts.iter().map(|e| e.key().0.clone()).collect();
        let payload = serde_json::to_string(&MarketSubscription::new(ids))
            .map_err(|e| GatewayBError::Stream(e.to_string()))?;
        self.client
            .send(WsMessage::Text(payload))
            .map_err(|e| GatewayBError::Stream(e.to_string()))
    }

    /// Add a token to the live subscription set. Safe to call from multiple
    /// tasks concurrently; the connection is only resubscribed when the
    /// token's reference count goes 0 -> 1.
    pub fn subscribe(&self, token: &TokenId) -> Result<(), GatewayBError> {
        let mut went_to_one = false;
        self.refcounts
            .entry(token.clone())
            .and_modify(|count| *count += 1)
            .or_insert_with(|| {
                went_to_one = true;
                1
            });
        if went_to_one {
            self.resubscribe()?;
        }
        Ok(())
    }

    /// Drop interest in a token. Resubscribes without it once the last
    /// holder releases it.
    pub fn unsubscribe(&self, token: &TokenId) -> Result<(), GatewayBError> {
        let mut drop_to_zero = false;
        if let Some(mut entry) = self.refcounts.get_mut(token) {
            *entry -= 1;
            if *entry == 0 {
                drop_to_zero = true;
            }
        }
        if drop_to_zero {
            self.refcounts.remove(token);
            self.cache.remove(&CacheKey::new(Venue::B, token.clone()));
            self.resubscribe()?;
        }
        Ok(())
    }

    /// Drain connection events until shutdown. Intended to run in its own
    /// task; cancellation is via the caller dropping the returned handle or
    /// flipping the shutdown flag through `shutdown()`.
    pub async fn run(&self) {
        loop {
            if !self.shutdown.load(Ordering::Acquire) {
                break;
            }
            match self.client.try_recv_event() {
                Some(ClientEvent::Error(err)) => warn!("venue-b market stream error: {}", err),
                Some(ClientEvent::Disconnected) => warn!("venue-b market stream disconnected"),
                Some(_) => {}
                None => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
    }

    /// Signals shutdown to both `run`'s drain loop and the underlying
    /// client's own reconnect loop (they share the same flag, wired in at
    /// `connect` time). `WebSocketClient::shutdown` takes the client by
    /// value, so with the client held behind `&self` here the flag is the
    /// only teardown channel available; this mirrors the external-trigger
    /// path the client documents for its own `shutdown_flag()`.
    pub fn shutdown(&self) {
        self.shutdown.store(false, Ordering::Release);
    }

    /// REST fallback for a single book read, used by the orderbook cache's
    /// synchronous-fetch-on-miss and single-flight background-refresh paths
    /// when no recent WS update covers this token.
    pub async fn get_orderbook(&self, token: &TokenId) -> Result<crate::domain::Orderbook, GatewayBError> {
        let book = self.trading.rest().get_orderbook(&token.0).await?;
        let mut ob = crate::domain::Orderbook::new(token.0.clone());
        ob.process_snapshot(&book.bids, &book.asks);
        Ok(ob)
    }

    /// Reads the operator's current holding of a token, used only to
    /// validate SELL-task entry.
    pub async fn get_position(&self, token: &TokenId) -> Result<crate::domain::PositionSnapshot, GatewayBError> {
        let address = self.trading.maker_address();
        let positions = self.trading.rest().get_positions(address).await?;
        let position = positions.into_iter().find(|p| p.asset_id == token.0);
        Ok(match position {
            Some(p) => crate::domain::PositionSnapshot {
                shares: p.size.parse().unwrap_or(0.0),
                avg_price: p.avg_price.unwrap_or(0.0),
            },
            None => crate::domain::PositionSnapshot { shares: 0.0, avg_price: 0.0 },
        })
    }

    /// Submit an IOC hedge order. Uses FAK (partial fills allowed, remainder
    /// cancelled) rather than FOK so a size that can only partially fill
    /// still hedges what it can instead of being rejected outright and
    /// leaving the predict leg naked.
    pub async fn hedge(
        &self,
        token: &TokenId,
        side: crate::infrastructure::client::clob::Side,
        price: f64,
        size: f64,
        neg_risk: bool,
    ) -> Result<crate::infrastructure::client::clob::OrderPlacementResponse, GatewayBError> {
        use crate::infrastructure::client::clob::OrderType;
        let response = self
            .trading
            .place_order_with_neg_risk(&token.0, price, size, side, OrderType::FAK, neg_risk)
            .await?;
        if !response.success {
            return Err(GatewayBError::Rejected(
                response.error_msg.clone().unwrap_or_else(|| "hedge rejected".to_string()),
            ));
        }
        Ok(response)
    }
}
