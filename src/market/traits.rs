//! Collaborator contracts consumed by the evaluator.
//!
//! Transport, query encoding and failover live behind these traits. Every
//! call may fail on its own; callers attribute the failure to the market
//! the call was made for.

use async_trait::async_trait;

use super::types::{FundingRateRecord, MarketStatus, Position};

/// Market registry and per-market state queries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Ids of every market known to the factory.
    async fn list_markets(&self) -> anyhow::Result<Vec<String>>;

    /// Resolve a market id to its contract address.
    async fn market_info(&self, market_id: &str) -> anyhow::Result<String>;

    /// Current status and risk configuration of a market.
    async fn market_status(&self, market_addr: &str) -> anyhow::Result<MarketStatus>;

    /// Position token ids held by `owner` in a market.
    async fn open_position_ids(&self, market_addr: &str, owner: &str)
        -> anyhow::Result<Vec<String>>;

    /// Full position details for the given ids.
    async fn position_details(
        &self,
        market_addr: &str,
        position_ids: &[String],
    ) -> anyhow::Result<Vec<Position>>;
}

/// Spot price lookup.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Latest price for a feed, already scaled by the feed exponent.
    async fn latest_scaled_price(&self, feed_id: &str) -> anyhow::Result<f64>;
}

/// Historical funding rates.
#[async_trait]
pub trait FundingHistorySource: Send + Sync {
    /// Samples between two calendar days (`YYYY-MM-DD`, inclusive).
    async fn funding_rate_history(
        &self,
        market_addr: &str,
        start_date: &str,
        end_date: &str,
    ) -> anyhow::Result<Vec<FundingRateRecord>>;
}
