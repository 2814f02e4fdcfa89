//! CLOB (Central Limit Order Book) API client and types
//!
//! Provides REST and WebSocket clients for trading on Polymarket.

pub mod helpers;
pub mod constants;
pub mod order_builder;
pub mod orderbook;
pub mod rest;
pub mod trading;
pub mod types;

pub use hypersockets::WebSocketClient;
pub use rest::{RestClient, RestError};
pub use trading::{TradingClient, TradingError};
pub use types::*;
