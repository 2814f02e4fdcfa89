//! Opportunity Scanner interface.
//!
//! The scanner that turns live Venue-A/Venue-B orderbook state into scored
//! `ArbitrageOpportunity` candidates is dashboard/strategy glue and lives
//! outside this crate's core; what belongs here is the seam the Task
//! Registry consumes it through. Shaped after
//! `strategies::market_merger::services::OpportunityScanner::scan`, whose
//! single scoring entry point this trait generalizes to an async,
//! venue-pair-agnostic signature.

use async_trait::async_trait;

use crate::domain::ArbitrageOpportunity;

/// Implemented by whatever continuously re-evaluates both venues' books and
/// proposes pair trades. The Task Registry (or whatever operator surface
/// sits in front of it) polls `scan` and turns the results it accepts into
/// `TaskConfig`s; the scanner itself never constructs a task.
#[async_trait]
pub trait OpportunityScanner: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the opportunities currently viable across the scanner's
    /// tracked markets, best first. An empty vec means nothing clears the
    /// scanner's own profitability threshold right now, not an error.
    async fn scan(&self) -> Result<Vec<ArbitrageOpportunity>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArbitrageOpportunity, Outcome};

    struct FixedScanner(Vec<ArbitrageOpportunity>);

    #[derive(Debug, thiserror::Error)]
    #[error("fixed scanner never fails")]
    struct Never;

    #[async_trait]
    impl OpportunityScanner for FixedScanner {
        type Error = Never;

        async fn scan(&self) -> Result<Vec<ArbitrageOpportunity>, Self::Error> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn scan_returns_configured_opportunities() {
        let opp = ArbitrageOpportunity {
            venue_a_market_id: "m1".into(),
            venue_b_yes_token: crate::domain::TokenId("yes".to_string()),
            venue_b_no_token: crate::domain::TokenId("no".to_string()),
            outcome: Outcome::Yes,
            venue_a_best_price: 0.45,
            venue_b_best_price: 0.52,
            projected_profit_pct: 0.03,
            projected_depth: 120.0,
            observed_at: chrono::Utc::now(),
        };
        let scanner = FixedScanner(vec![opp.clone()]);
        let results = scanner.scan().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].venue_a_market_id, opp.venue_a_market_id);
    }
}
