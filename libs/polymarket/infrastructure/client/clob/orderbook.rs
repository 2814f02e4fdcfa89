//! High-performance orderbook data structure
//!
//! Re-exports orderbook domain entities from crate::domain::orderbook

// Re-export all orderbook types from domain
pub use crate::domain::orderbook::*;
