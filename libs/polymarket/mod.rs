//! Cross-venue arbitrage execution engine for binary prediction markets.
//!
//! Clean Architecture layering:
//! - `domain`: pure entities, no I/O
//! - `infrastructure`: venue gateways, caches, config, logging
//! - `application`: use cases (fill aggregation, guard, task executor, registry, log sink)

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod utils;

pub use infrastructure::{PolymarketAuth, RestClient};
pub use utils::{Heartbeat, ShutdownManager};
