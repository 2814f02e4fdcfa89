//! Venue-agnostic identifiers shared across the domain and application layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which venue a piece of state or a gateway call belongs to.
///
/// Venue A is the authenticated-REST-plus-on-chain-settlement side (order
/// submission, cancellation, status, block-event fills). Venue B is the
/// low-latency CLOB whose orderbook stream drives the cost guard and whose
/// REST surface is used for IOC hedge fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Venue {
    A,
    B,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Venue::A => write!(f, "venue_a"),
            Venue::B => write!(f, "venue_b"),
        }
    }
}

/// Opaque task identifier. Newtype instead of a bare `String` so call sites
/// can't confuse a task id with an order hash or a token id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        TaskId(s)
    }
}

/// Venue-A order identity. Some status endpoints index on the hash, others
/// on the venue-internal id, so both are carried from submission onward.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderRef {
    pub hash: String,
    pub id: String,
}

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hash)
    }
}

/// A token id on either venue. YES and NO tokens of the same market are a
/// complementary pair; `inverted` on the task config records whether the two
/// venues pose the underlying question the same way or as complements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId(pub String);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
