//! User Channel - wire types and WebSocket routing for Venue-A's
//! authenticated user channel.
//!
//! [`GatewayA::subscribe_fills`] is the only consumer: it builds its own
//! WebSocket client against [`UserRouter`]/[`UserConfig`] and turns matched
//! `UserMessage::Trade` events into `FillEvent`s via the Fill Aggregator,
//! rather than maintaining its own order-book state here.

mod types;
mod user_ws;

pub use types::{
    AuthPayload, MakerOrder, OrderMessage, OrderType, TradeMessage, TradeStatus as WsTradeStatus,
    UserMessage, UserSubscription,
};

pub use user_ws::{UserConfig, UserRoute, UserRouter};
