//! User Channel WebSocket parsing and subscription.
//!
//! Connects to the Polymarket user WebSocket channel for real-time
//! order and trade updates. [`GatewayA::subscribe_fills`] builds the client
//! itself and routes `UserMessage::Trade` into `FillEvent`s; this module
//! owns only the wire-level concerns (auth config, message routing).
//!
//! See: https://docs.polymarket.com/developers/CLOB/websocket/user-channel

use super::types::{OrderMessage, TradeMessage, UserMessage, UserSubscription};
use anyhow::Result;
use hypersockets::{MessageRouter, WsMessage};
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for user WebSocket connection
pub struct UserConfig {
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
}

impl UserConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("API_KEY")
            .map_err(|_| anyhow::anyhow!("API_KEY environment variable not set"))?;
        let api_secret = std::env::var("API_SECRET")
            .map_err(|_| anyhow::anyhow!("API_SECRET environment variable not set"))?;
        let api_passphrase = std::env::var("API_PASSPHRASE")
            .map_err(|_| anyhow::anyhow!("API_PASSPHRASE environment variable not set"))?;

        Ok(Self {
            api_key,
            api_secret,
            api_passphrase,
        })
    }

    /// Create subscription message
    pub fn subscription(&self) -> UserSubscription {
        UserSubscription::new(
            self.api_key.clone(),
            self.api_secret.clone(),
            self.api_passphrase.clone(),
        )
    }
}

// =============================================================================
// Router
// =============================================================================

/// Route key for user messages
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum UserRoute {
    User,
}

/// Router for parsing user channel WebSocket messages
pub struct UserRouter;

#[async_trait::async_trait]
impl MessageRouter for UserRouter {
    type Message = UserMessage;
    type RouteKey = UserRoute;

    async fn parse(&self, message: WsMessage) -> hypersockets::Result<Self::Message> {
        let text = match message.as_text() {
            Some(t) => t,
            None => return Ok(UserMessage::Unknown("Binary data".to_string())),
        };

        if text == "PONG" {
            return Ok(UserMessage::Pong);
        }

        if let Ok(trade) = serde_json::from_str::<TradeMessage>(text) {
            if trade.event_type == "trade" {
                return Ok(UserMessage::Trade(trade));
            }
        }

        if let Ok(order) = serde_json::from_str::<OrderMessage>(text) {
            if order.event_type == "order" {
                return Ok(UserMessage::Order(order));
            }
        }

        debug!("[UserWS] Unknown message: {}", text);
        Ok(UserMessage::Unknown(text.to_string()))
    }

    fn route_key(&self, _message: &Self::Message) -> Self::RouteKey {
        UserRoute::User
    }
}
