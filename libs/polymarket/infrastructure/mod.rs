//! Infrastructure Layer
//!
//! Venue transports (`client`), the shared orderbook cache, the two venue
//! gateways built on top of `client`, and process-wide config/logging.
//! Depends on the domain layer but not on the application layer.

pub mod cache;
pub mod client;
pub mod error;
pub mod gateway_a;
pub mod gateway_b;
pub mod logging;

pub use cache::{CacheKey, CacheRead, OrderbookCache};
pub use client::{PolymarketAuth, RestClient, TradingClient};
pub use error::{ErrorClass, ErrorKind};
pub use gateway_a::{GatewayA, GatewayAError};
pub use gateway_b::{GatewayB, GatewayBError};
pub use logging::{init_tracing, init_tracing_with_level};
