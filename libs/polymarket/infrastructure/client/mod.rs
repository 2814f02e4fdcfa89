//! Venue client transports.
//!
//! `clob` carries the REST order/market surface and the `trading` fluent
//! builder used by both venue gateways; `user` carries the authenticated
//! WS channel used as Venue-A's fill notification tail.

pub mod auth;
pub mod clob;
pub mod user;

pub use auth::PolymarketAuth;
pub use clob::{
    Market, OrderArgs, OrderBook, OrderType, Outcome, PriceLevel, RestClient, Side,
    TradingClient, TradingError, WebSocketClient,
};
