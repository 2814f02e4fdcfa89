//! Domain Layer
//!
//! Contains pure business entities and domain models.
//! This layer has no dependencies on infrastructure or application layers.

pub mod fill;
pub mod opportunity;
pub mod orderbook;
pub mod task;
pub mod venue;

pub use fill::{FillEvent, FillRecord, RestFillReport, RestOrderState};
pub use opportunity::{ArbitrageOpportunity, PositionSnapshot};
pub use orderbook::{micros_to_f64, price_to_micros, Orderbook, OrderbookSide, PriceLevel};
pub use task::{
    CancelReason, Direction, Outcome, Strategy, TaskConfig, TaskProgress, TaskSnapshot, TaskStatus,
};
pub use venue::{OrderRef, TaskId, TokenId, Venue};
