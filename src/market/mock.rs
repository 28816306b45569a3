//! In-memory market source for paper runs and tests.
//!
//! Implements every collaborator trait from a fixed set of markets, prices
//! and funding histories. Individual calls can be made to fail per market
//! (or per price feed) to exercise partial-failure handling.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::traits::{FundingHistorySource, MarketDataSource, PriceOracle};
use super::types::{Direction, FundingRateRecord, MarketConfig, MarketStatus, Position};

/// Call that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    MarketInfo,
    MarketStatus,
    OpenPositions,
    PositionDetails,
    /// Keyed by price feed id rather than market id
    Price,
    History,
}

/// A simulated market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockMarket {
    pub market_id: String,
    pub market_addr: String,
    pub status: MarketStatus,
    /// Open positions as (owner, position)
    #[serde(default)]
    pub positions: Vec<(String, Position)>,
    #[serde(default)]
    pub history: Vec<FundingRateRecord>,
}

impl MockMarket {
    pub fn new(market_id: &str, market_addr: &str, status: MarketStatus) -> Self {
        Self {
            market_id: market_id.to_string(),
            market_addr: market_addr.to_string(),
            status,
            positions: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Attach funding history.
    pub fn with_history(mut self, history: Vec<FundingRateRecord>) -> Self {
        self.history = history;
        self
    }
}

/// JSON fixture accepted by [`MockMarketSource::from_fixture`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockFixture {
    #[serde(default)]
    pub markets: Vec<MockMarket>,
    /// Price feed id -> scaled price
    #[serde(default)]
    pub prices: HashMap<String, f64>,
    /// Market id -> price feed id
    #[serde(default)]
    pub price_feeds: HashMap<String, String>,
}

/// Mock source backed by in-memory state.
pub struct MockMarketSource {
    markets: RwLock<Vec<MockMarket>>,
    prices: RwLock<HashMap<String, f64>>,
    failures: RwLock<HashSet<(String, FailurePoint)>>,
    fail_listing: AtomicBool,
    /// Added to every price; lets tests tell cycles apart
    price_epoch: AtomicU64,
}

impl Default for MockMarketSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMarketSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self {
            markets: RwLock::new(Vec::new()),
            prices: RwLock::new(HashMap::new()),
            failures: RwLock::new(HashSet::new()),
            fail_listing: AtomicBool::new(false),
            price_epoch: AtomicU64::new(0),
        }
    }

    /// Load a fixture file. Returns the source and the fixture's price feed
    /// mapping so it can be merged into the configuration.
    pub fn from_fixture(path: impl AsRef<Path>) -> Result<(Self, HashMap<String, String>)> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        let fixture: MockFixture = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse fixture {}", path.display()))?;

        info!(
            markets = fixture.markets.len(),
            prices = fixture.prices.len(),
            fixture = %path.display(),
            "Loaded mock market fixture"
        );

        // Replay each history so its latest sample lands at load time
        let now = Utc::now();
        let mut markets = fixture.markets;
        for market in &mut markets {
            if let Some(latest) = market.history.iter().map(|r| r.timestamp).max() {
                let shift = now - latest;
                for record in &mut market.history {
                    record.timestamp += shift;
                }
            }
        }

        let source = Self {
            markets: RwLock::new(markets),
            prices: RwLock::new(fixture.prices),
            ..Self::new()
        };
        Ok((source, fixture.price_feeds))
    }

    pub async fn add_market(&self, market: MockMarket) {
        self.markets.write().await.push(market);
    }

    /// Add an open position owned by `owner` to a market.
    pub async fn add_position(&self, market_id: &str, owner: &str, position: Position) {
        if let Some(m) = self
            .markets
            .write()
            .await
            .iter_mut()
            .find(|m| m.market_id == market_id)
        {
            m.positions.push((owner.to_string(), position));
        }
    }

    /// Replace a market's status.
    pub async fn set_status(&self, market_id: &str, status: MarketStatus) {
        if let Some(m) = self
            .markets
            .write()
            .await
            .iter_mut()
            .find(|m| m.market_id == market_id)
        {
            m.status = status;
        }
    }

    /// Replace a market's funding history.
    pub async fn set_history(&self, market_id: &str, history: Vec<FundingRateRecord>) {
        if let Some(m) = self
            .markets
            .write()
            .await
            .iter_mut()
            .find(|m| m.market_id == market_id)
        {
            m.history = history;
        }
    }

    pub async fn set_price(&self, feed_id: &str, price: f64) {
        self.prices.write().await.insert(feed_id.to_string(), price);
    }

    /// Shift every returned price by `epoch`.
    pub fn set_price_epoch(&self, epoch: u64) {
        self.price_epoch.store(epoch, Ordering::SeqCst);
    }

    /// Make `point` fail for `key` (market id, or feed id for prices).
    pub async fn fail(&self, key: &str, point: FailurePoint) {
        self.failures.write().await.insert((key.to_string(), point));
    }

    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    async fn check(&self, key: &str, point: FailurePoint) -> Result<()> {
        if self.failures.read().await.contains(&(key.to_string(), point)) {
            anyhow::bail!("Injected {:?} failure for {}", point, key);
        }
        Ok(())
    }

    async fn market_by_addr(&self, market_addr: &str) -> Result<MockMarket> {
        self.markets
            .read()
            .await
            .iter()
            .find(|m| m.market_addr == market_addr)
            .cloned()
            .with_context(|| format!("Unknown market address {}", market_addr))
    }
}

#[async_trait]
impl MarketDataSource for MockMarketSource {
    async fn list_markets(&self) -> Result<Vec<String>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            anyhow::bail!("Injected list_markets failure");
        }
        Ok(self
            .markets
            .read()
            .await
            .iter()
            .map(|m| m.market_id.clone())
            .collect())
    }

    async fn market_info(&self, market_id: &str) -> Result<String> {
        self.check(market_id, FailurePoint::MarketInfo).await?;
        self.markets
            .read()
            .await
            .iter()
            .find(|m| m.market_id == market_id)
            .map(|m| m.market_addr.clone())
            .with_context(|| format!("Unknown market id {}", market_id))
    }

    async fn market_status(&self, market_addr: &str) -> Result<MarketStatus> {
        let market = self.market_by_addr(market_addr).await?;
        self.check(&market.market_id, FailurePoint::MarketStatus).await?;
        Ok(market.status)
    }

    async fn open_position_ids(&self, market_addr: &str, owner: &str) -> Result<Vec<String>> {
        let market = self.market_by_addr(market_addr).await?;
        self.check(&market.market_id, FailurePoint::OpenPositions).await?;
        Ok(market
            .positions
            .iter()
            .filter(|(o, _)| o == owner)
            .map(|(_, p)| p.id.clone())
            .collect())
    }

    async fn position_details(
        &self,
        market_addr: &str,
        position_ids: &[String],
    ) -> Result<Vec<Position>> {
        let market = self.market_by_addr(market_addr).await?;
        self.check(&market.market_id, FailurePoint::PositionDetails).await?;
        Ok(market
            .positions
            .into_iter()
            .map(|(_, p)| p)
            .filter(|p| position_ids.contains(&p.id))
            .collect())
    }
}

#[async_trait]
impl PriceOracle for MockMarketSource {
    async fn latest_scaled_price(&self, feed_id: &str) -> Result<f64> {
        self.check(feed_id, FailurePoint::Price).await?;
        let price = self
            .prices
            .read()
            .await
            .get(feed_id)
            .copied()
            .with_context(|| format!("No price for feed {}", feed_id))?;
        Ok(price + self.price_epoch.load(Ordering::SeqCst) as f64)
    }
}

#[async_trait]
impl FundingHistorySource for MockMarketSource {
    async fn funding_rate_history(
        &self,
        market_addr: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<FundingRateRecord>> {
        let market = self.market_by_addr(market_addr).await?;
        self.check(&market.market_id, FailurePoint::History).await?;

        let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d")
            .with_context(|| format!("Invalid start date {}", start_date))?;
        let end = NaiveDate::parse_from_str(end_date, "%Y-%m-%d")
            .with_context(|| format!("Invalid end date {}", end_date))?;

        let records: Vec<FundingRateRecord> = market
            .history
            .into_iter()
            .filter(|r| {
                let day = r.timestamp.date_naive();
                day >= start && day <= end
            })
            .collect();

        debug!(
            market = %market_addr,
            start_date,
            end_date,
            samples = records.len(),
            "Served mock funding history"
        );
        Ok(records)
    }
}

/// Market status with sensible risk parameters and the given open interest
/// and funding rates. USD values mirror notionals.
pub fn sample_status(
    long_notional: &str,
    short_notional: &str,
    long_funding: &str,
    short_funding: &str,
) -> MarketStatus {
    MarketStatus {
        market_type: "collateral_is_quote".to_string(),
        config: MarketConfig {
            trading_fee_notional_size: "0.001".to_string(),
            trading_fee_counter_collateral: "0.001".to_string(),
            funding_rate_sensitivity: "2".to_string(),
            funding_rate_max_annualized: "0.9".to_string(),
            delta_neutrality_fee_sensitivity: "100000000".to_string(),
            delta_neutrality_fee_cap: "0.005".to_string(),
            borrow_fee_rate_min_annualized: "0.01".to_string(),
            borrow_fee_rate_max_annualized: "0.6".to_string(),
        },
        long_notional: long_notional.to_string(),
        short_notional: short_notional.to_string(),
        long_usd: long_notional.to_string(),
        short_usd: short_notional.to_string(),
        long_funding: long_funding.to_string(),
        short_funding: short_funding.to_string(),
        borrow_fee: "0.03".to_string(),
    }
}

/// A position without liquidation or take-profit triggers.
pub fn sample_position(id: &str, direction: Direction) -> Position {
    Position {
        id: id.to_string(),
        direction,
        liquidation_price: None,
        take_profit_price: None,
        entry_price: "100".to_string(),
        collateral: "100".to_string(),
        notional_size: "300".to_string(),
        leverage: "3".to_string(),
    }
}

/// Hourly history ending at `end`, oldest first, with constant rates.
pub fn hourly_history(end: DateTime<Utc>, hours: i64, long: &str, short: &str) -> Vec<FundingRateRecord> {
    (0..hours)
        .rev()
        .map(|h| FundingRateRecord {
            timestamp: end - Duration::hours(h),
            long_rate: long.to_string(),
            short_rate: short.to_string(),
        })
        .collect()
}
