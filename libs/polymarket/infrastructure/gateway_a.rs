//! Venue-A gateway: authenticated REST order lifecycle plus the user-channel
//! fill tail that stands in for Venue-A's on-chain settlement confirmation.
//!
//! Order submit/cancel/status and market-info calls go through
//! [`TradingClient`]/[`RestClient`]; fills arrive out-of-band over the
//! authenticated WS user channel (`client::user`), matching the way the
//! original bot tracked its own order book via `spawn_user_order_tracker`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use hypersockets::core::*;
use hypersockets::{ClientEvent, MessageHandler, WebSocketClientBuilder, WsMessage};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::VenueAConfig;
use crate::domain::{
    Direction, FillEvent, Outcome, OrderRef, Orderbook, RestFillReport, RestOrderState, TokenId,
};
use crate::infrastructure::client::clob::{Market, OrderType as ClobOrderType, Side as ClobSide};
use crate::infrastructure::client::clob::{RestError, TradingClient, TradingError};
use crate::infrastructure::client::user::{TradeMessage, UserConfig, UserMessage, UserRoute, UserRouter};
use crate::infrastructure::error::{ErrorClass, ErrorKind};

/// Minimum order notional (price * size, in USD) accepted without a network
/// round-trip.
const MIN_NOTIONAL_USD: f64 = 0.90;
/// Share-size precision: 5 decimals.
const SIZE_PRECISION: f64 = 100_000.0;
/// How long a fetched `Market` stays valid in [`GatewayA`]'s in-process cache.
const MARKET_INFO_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum GatewayAError {
    #[error("venue-a transport error: {0}")]
    Transport(#[from] TradingError),

    #[error("venue-a rest error: {0}")]
    Rest(#[from] RestError),

    #[error("venue-a rejected the request: {0}")]
    Rejected(String),

    #[error("venue-a returned an unparseable response: {0}")]
    Invalid(String),

    #[error("venue-a user channel unavailable: {0}")]
    UserChannel(String),

    #[error("order value {0:.4} below minimum notional")]
    BelowMinNotional(f64),

    #[error("market info unavailable: {0}")]
    MarketInfoUnavailable(String),

    #[error("order rejected for precision: {0}")]
    PrecisionRejected(String),

    #[error("venue-a auth expired: {0}")]
    AuthExpired(String),
}

impl ErrorClass for GatewayAError {
    fn kind(&self) -> ErrorKind {
        match self {
            GatewayAError::Transport(_) | GatewayAError::Rest(_) | GatewayAError::MarketInfoUnavailable(_) => {
                ErrorKind::Transient
            }
            GatewayAError::Rejected(_) => ErrorKind::RejectedByVenue,
            GatewayAError::Invalid(_) => ErrorKind::Semantic,
            GatewayAError::BelowMinNotional(_) | GatewayAError::PrecisionRejected(_) => ErrorKind::LocalCorrectable,
            GatewayAError::UserChannel(_) | GatewayAError::AuthExpired(_) => ErrorKind::Fatal,
        }
    }
}

fn to_clob_side(direction: Direction) -> ClobSide {
    match direction {
        Direction::Buy => ClobSide::Buy,
        Direction::Sell => ClobSide::Sell,
    }
}

fn outcome_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Yes => "Yes",
        Outcome::No => "No",
    }
}

/// Rejects an order before it reaches the network: below-minimum notional or
/// a size that isn't aligned to 5 decimals.
fn check_precision(price: f64, size: f64) -> Result<(), GatewayAError> {
    let notional = price * size;
    if notional < MIN_NOTIONAL_USD {
        return Err(GatewayAError::BelowMinNotional(notional));
    }
    let aligned = (size * SIZE_PRECISION).round() / SIZE_PRECISION;
    if (aligned - size).abs() > 1e-9 {
        return Err(GatewayAError::PrecisionRejected(format!(
            "size {} is not aligned to 5 decimals",
            size
        )));
    }
    Ok(())
}

fn is_auth_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("401") || lower.contains("403") || lower.contains("unauthorized") || lower.contains("forbidden")
}

fn classify_trading_error(e: TradingError) -> GatewayAError {
    if is_auth_error(&e.to_string()) {
        GatewayAError::AuthExpired(e.to_string())
    } else {
        GatewayAError::Transport(e)
    }
}

fn classify_rest_error(e: RestError) -> GatewayAError {
    if is_auth_error(&e.to_string()) {
        GatewayAError::AuthExpired(e.to_string())
    } else {
        GatewayAError::Rest(e)
    }
}

struct MarketInfoEntry {
    market: Market,
    fetched_at: Instant,
}

/// Venue-A gateway. One instance is shared across all tasks trading against
/// the same wallet; `TradingClient` already serializes its own HTTP client
/// behind a `RwLock`.
pub struct GatewayA {
    trading: TradingClient,
    market_cache: RwLock<HashMap<String, MarketInfoEntry>>,
}

impl GatewayA {
    pub async fn connect(cfg: &VenueAConfig, private_key: &str) -> Result<Self, GatewayAError> {
        let trading = TradingClient::new(private_key, None, &cfg.rest_url, None).await?;
        debug!(chain_id = cfg.chain_id, "venue-a gateway connected");
        Ok(Self {
            trading,
            market_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Resolves a Venue-A market id plus outcome side to the concrete token
    /// id that order submission and book reads operate on. The token id is
    /// Venue-B's identifier namespace for the same underlying asset; a
    /// market id is never substituted for one directly.
    async fn resolve_outcome_token(&self, market_id: &str, outcome: Outcome) -> Result<String, GatewayAError> {
        let market = self.market_info(market_id).await?;
        let label = outcome_label(outcome);
        market
            .outcomes
            .iter()
            .find(|o| o.outcome.eq_ignore_ascii_case(label))
            .map(|o| o.id.clone())
            .ok_or_else(|| GatewayAError::MarketInfoUnavailable(format!("market {} has no {} outcome", market_id, label)))
    }

    pub async fn submit_order(
        &self,
        market_id: &str,
        outcome: Outcome,
        direction: Direction,
        price: f64,
        size: f64,
        post_only: bool,
        neg_risk: bool,
    ) -> Result<OrderRef, GatewayAError> {
        check_precision(price, size)?;

        let token_id = self.resolve_outcome_token(market_id, outcome).await?;

        let order_type = if post_only {
            ClobOrderType::GTC
        } else {
            ClobOrderType::FOK
        };
        let resp = self
            .trading
            .place_order_with_neg_risk(&token_id, price, size, to_clob_side(direction), order_type, neg_risk)
            .await
            .map_err(classify_trading_error)?;

        if !resp.success {
            return Err(GatewayAError::Rejected(
                resp.error_msg.unwrap_or_else(|| "order rejected".to_string()),
            ));
        }
        let id = resp
            .order_id
            .ok_or_else(|| GatewayAError::Invalid("order accepted with no orderID".to_string()))?;
        let hash = resp
            .order_hashes
            .and_then(|hashes| hashes.into_iter().next())
            .unwrap_or_else(|| id.clone());
        Ok(OrderRef { hash, id })
    }

    pub async fn cancel_order(&self, order: &OrderRef) -> Result<(), GatewayAError> {
        let resp = self.trading.cancel_order(&order.id).await.map_err(classify_trading_error)?;
        if resp.canceled.iter().any(|id| id == &order.id) {
            return Ok(());
        }
        if let Some(reason) = resp.not_canceled.get(&order.id) {
            return Err(GatewayAError::Rejected(reason.clone()));
        }
        // Not present in either list: most likely already filled/expired.
        Ok(())
    }

    pub async fn get_orderbook(&self, token: &TokenId) -> Result<Orderbook, GatewayAError> {
        let book = self.trading.rest().get_orderbook(&token.0).await.map_err(classify_rest_error)?;
        let mut ob = Orderbook::new(token.0.clone());
        ob.process_snapshot(&book.bids, &book.asks);
        Ok(ob)
    }

    /// Looks up a Venue-A market by id, serving from the 5-minute TTL cache
    /// when possible.
    pub async fn get_market_info(&self, market_id: &str) -> Result<Market, GatewayAError> {
        self.market_info(market_id).await
    }

    async fn market_info(&self, market_id: &str) -> Result<Market, GatewayAError> {
        if let Some(entry) = self.market_cache.read().get(market_id) {
            if entry.fetched_at.elapsed() < MARKET_INFO_TTL {
                return Ok(entry.market.clone());
            }
        }
        let market = self
            .trading
            .rest()
            .get_market(market_id)
            .await
            .map_err(classify_rest_error)?;
        self.market_cache.write().insert(
            market_id.to_string(),
            MarketInfoEntry { market: market.clone(), fetched_at: Instant::now() },
        );
        Ok(market)
    }

    /// REST poll of a single order's fill state, used alongside the
    /// block-event tail so the fill aggregator always has a fallback source.
    pub async fn poll_order_state(&self, order: &OrderRef) -> Result<RestFillReport, GatewayAError> {
        use crate::infrastructure::client::clob::OpenOrderParams;

        let params = OpenOrderParams {
            id: Some(order.id.clone()),
            market: None,
            asset_id: None,
        };
        let page = self
            .trading
            .rest()
            .get_orders(self.trading.auth(), Some(&params), None)
            .await?;

        let raw = page
            .data
            .into_iter()
            .find(|o| o.get("id").and_then(|v| v.as_str()) == Some(order.id.as_str()));

        let Some(raw) = raw else {
            // Not in the open-orders list: fully filled, cancelled, or expired.
            // Callers fall back to the last known block-event fill state.
            return Ok(RestFillReport {
                state: RestOrderState::Filled,
                filled_qty: 0.0,
                remaining_qty: 0.0,
                avg_price: 0.0,
                cancel_reason: None,
                report_timestamp: Utc::now(),
            });
        };

        let parse_f64 = |key: &str| -> f64 {
            raw.get(key)
                .and_then(|v| v.as_str().and_then(|s| s.parse::<f64>().ok()).or_else(|| v.as_f64()))
                .unwrap_or(0.0)
        };

        let original_size = parse_f64("original_size");
        let size_matched = parse_f64("size_matched");
        let price = parse_f64("price");
        let status = raw
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("LIVE")
            .to_uppercase();

        let state = match status.as_str() {
            "LIVE" if size_matched > 0.0 => RestOrderState::PartiallyFilled,
            "LIVE" => RestOrderState::Open,
            "MATCHED" | "FILLED" => RestOrderState::Filled,
            "CANCELED" | "CANCELLED" => RestOrderState::Cancelled,
            "EXPIRED" => RestOrderState::Expired,
            other => {
                warn!(status = other, order_id = %order.id, "unrecognized venue-a order status");
                RestOrderState::Open
            }
        };

        Ok(RestFillReport {
            state,
            filled_qty: size_matched,
            remaining_qty: (original_size - size_matched).max(0.0),
            avg_price: price,
            cancel_reason: None,
            report_timestamp: Utc::now(),
        })
    }

    /// Spawn the user-channel WS tail and forward matched/confirmed trades as
    /// [`FillEvent`]s on an mpsc channel. This is the concrete stand-in for
    /// Venue-A's on-chain block-event fill stream: the user channel's trade
    /// `id` plays the role of the settlement transaction hash, since a
    /// single CLOB trade settles in exactly one on-chain transaction. The
    /// returned shutdown flag stops the tracker when set to `true`.
    pub async fn subscribe_fills(
        &self,
        cfg: &VenueAConfig,
    ) -> Result<(mpsc::Receiver<FillEvent>, Arc<AtomicBool>), GatewayAError> {
        let user_cfg =
            UserConfig::from_env().map_err(|e| GatewayAError::UserChannel(e.to_string()))?;
        let (tx, rx) = mpsc::channel(256);
        let shutdown = Arc::new(AtomicBool::new(true));

        let subscription = user_cfg.subscription();
        let subscription_json = serde_json::to_string(&subscription)
            .map_err(|e| GatewayAError::UserChannel(e.to_string()))?;

        let handler = FillHandler { tx };
        let router = UserRouter;

        let client = WebSocketClientBuilder::new()
            .url(cfg.block_events_ws_url.clone())
            .router(router, move |routing| routing.handler(UserRoute::User, handler))
            .heartbeat(Duration::from_secs(5), WsMessage::Text("PING".to_string()))
            .subscription(WsMessage::Text(subscription_json))
            .shutdown_flag(shutdown.clone())
            .build()
            .await
            .map_err(|e| GatewayAError::UserChannel(e.to_string()))?;

        let loop_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                if !loop_shutdown.load(Ordering::Acquire) {
                    break;
                }
                match client.try_recv_event() {
                    Some(ClientEvent::Error(err)) => warn!("venue-a fill stream error: {}", err),
                    Some(ClientEvent::Disconnected) => warn!("venue-a fill stream disconnected"),
                    Some(_) => {}
                    None => tokio::time::sleep(Duration::from_millis(10)).await,
                }
            }
            if let Err(e) = client.shutdown().await {
                warn!("venue-a fill stream shutdown error: {}", e);
            }
        });

        Ok((rx, shutdown))
    }
}

/// Converts confirmed user-channel trades into [`FillEvent`]s.
struct FillHandler {
    tx: mpsc::Sender<FillEvent>,
}

impl FillHandler {
    fn to_fill_event(trade: &TradeMessage) -> FillEvent {
        let maker = trade
            .maker_orders
            .first()
            .map(|m| m.order_id.clone())
            .unwrap_or_default();
        let size: f64 = trade.size.parse().unwrap_or(0.0);
        let matched_amount: f64 = trade
            .maker_orders
            .iter()
            .filter_map(|m| m.matched_amount.parse::<f64>().ok())
            .sum();

        FillEvent {
            order_hash: trade.taker_order_id.clone().unwrap_or_else(|| trade.id.clone()),
            maker,
            taker: trade.taker_order_id.clone().unwrap_or_default(),
            maker_amount_filled: if matched_amount > 0.0 { matched_amount } else { size },
            taker_amount_filled: size,
            fee: 0.0,
            block_number: 0,
            tx_hash: trade.id.clone(),
            log_index: 0,
            timestamp: Utc::now(),
        }
    }
}

impl MessageHandler<UserMessage> for FillHandler {
    fn handle(&mut self, message: UserMessage) -> hypersockets::Result<()> {
        if let UserMessage::Trade(trade) = message {
            if matches!(trade.status.as_str(), "CONFIRMED" | "MINED") {
                let event = Self::to_fill_event(&trade);
                if self.tx.try_send(event).is_err() {
                    debug!("fill event dropped, subscriber channel full or closed");
                }
            }
        }
        Ok(())
    }
}
