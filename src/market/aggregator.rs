//! Market data aggregation.
//!
//! Builds a point-in-time map of every market known to the factory. Each
//! market is fetched in its own task; a failure only removes that market
//! from the result and is reported alongside it.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::traits::MarketDataSource;
use super::types::MarketSnapshot;

/// A market that could not be fetched this cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketFailure {
    pub market_id: String,
    pub error: String,
}

/// Result of one aggregation pass.
#[derive(Debug, Clone, Default)]
pub struct AggregateReport {
    /// Snapshots keyed by market address
    pub markets: HashMap<String, MarketSnapshot>,
    pub failures: Vec<MarketFailure>,
}

/// Fetches market info, status and open positions for all markets.
pub struct MarketDataAggregator {
    source: Arc<dyn MarketDataSource>,
    owner: String,
    max_concurrency: usize,
}

impl MarketDataAggregator {
    /// Create an aggregator tracking positions owned by `owner`.
    pub fn new(source: Arc<dyn MarketDataSource>, owner: String, max_concurrency: usize) -> Self {
        Self {
            source,
            owner,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Fetch every market.
    ///
    /// Only a failure to list markets fails the whole call.
    #[instrument(skip(self), name = "aggregate_markets")]
    pub async fn aggregate(&self) -> Result<AggregateReport> {
        let market_ids = self
            .source
            .list_markets()
            .await
            .context("Failed to list markets")?;

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles = Vec::with_capacity(market_ids.len());

        for market_id in market_ids {
            let sem = semaphore.clone();
            let source = self.source.clone();
            let owner = self.owner.clone();
            let id = market_id.clone();

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire().await.context("Semaphore closed")?;
                fetch_market(source.as_ref(), &id, &owner).await
            });

            handles.push((market_id, handle));
        }

        let mut report = AggregateReport::default();

        for (market_id, handle) in handles {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(anyhow::anyhow!("Task panicked: {}", e)),
            };

            match outcome {
                Ok(snapshot) => {
                    debug!(
                        market_id = %snapshot.market_id,
                        market = %snapshot.market_addr,
                        positions = snapshot.positions.len(),
                        "Fetched market"
                    );
                    report
                        .markets
                        .insert(snapshot.market_addr.clone(), snapshot);
                }
                Err(e) => {
                    warn!(%market_id, error = %format!("{:#}", e), "Market fetch failed");
                    report.failures.push(MarketFailure {
                        market_id,
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        info!(
            markets = report.markets.len(),
            failures = report.failures.len(),
            "Market aggregation complete"
        );

        Ok(report)
    }
}

/// Fetch a single market: address, then status and position ids together,
/// then position details when there is anything to fetch.
async fn fetch_market(
    source: &dyn MarketDataSource,
    market_id: &str,
    owner: &str,
) -> Result<MarketSnapshot> {
    let market_addr = source
        .market_info(market_id)
        .await
        .with_context(|| format!("Failed to fetch market info for {}", market_id))?;

    let (status, position_ids) = tokio::try_join!(
        async {
            source
                .market_status(&market_addr)
                .await
                .context("Failed to fetch market status")
        },
        async {
            source
                .open_position_ids(&market_addr, owner)
                .await
                .context("Failed to fetch open position ids")
        },
    )?;

    let positions = if position_ids.is_empty() {
        Vec::new()
    } else {
        source
            .position_details(&market_addr, &position_ids)
            .await
            .context("Failed to fetch position details")?
    };

    Ok(MarketSnapshot {
        market_id: market_id.to_string(),
        market_addr,
        status,
        positions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::mock::{sample_position, sample_status, FailurePoint, MockMarket};
    use crate::market::{Direction, MockMarketSource};

    async fn source_with_markets(n: usize) -> Arc<MockMarketSource> {
        let source = MockMarketSource::new();
        for i in 0..n {
            source
                .add_market(MockMarket::new(
                    &format!("ETH_USD_{}", i),
                    &format!("addr{}", i),
                    sample_status("1000", "800", "0.1", "-0.12"),
                ))
                .await;
        }
        Arc::new(source)
    }

    #[tokio::test]
    async fn test_aggregates_all_markets() {
        let source = source_with_markets(3).await;
        let aggregator = MarketDataAggregator::new(source, "executor".to_string(), 2);

        let report = aggregator.aggregate().await.unwrap();
        assert_eq!(report.markets.len(), 3);
        assert!(report.failures.is_empty());
        assert_eq!(report.markets["addr1"].market_id, "ETH_USD_1");
    }

    #[tokio::test]
    async fn test_single_market_failure_is_isolated() {
        let source = source_with_markets(3).await;
        source.fail("ETH_USD_1", FailurePoint::MarketStatus).await;
        let aggregator = MarketDataAggregator::new(source, "executor".to_string(), 4);

        let report = aggregator.aggregate().await.unwrap();
        assert_eq!(report.markets.len(), 2);
        assert!(!report.markets.contains_key("addr1"));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].market_id, "ETH_USD_1");
        assert!(report.failures[0].error.contains("market status"));
    }

    #[tokio::test]
    async fn test_listing_failure_fails_batch() {
        let source = source_with_markets(2).await;
        source.fail_listing(true);
        let aggregator = MarketDataAggregator::new(source, "executor".to_string(), 4);

        assert!(aggregator.aggregate().await.is_err());
    }

    #[tokio::test]
    async fn test_positions_fetched_only_for_owner() {
        let source = source_with_markets(1).await;
        source
            .add_position("ETH_USD_0", "executor", sample_position("11", Direction::Long))
            .await;
        source
            .add_position("ETH_USD_0", "someone-else", sample_position("12", Direction::Short))
            .await;
        let aggregator = MarketDataAggregator::new(source.clone(), "executor".to_string(), 1);

        let report = aggregator.aggregate().await.unwrap();
        let positions = &report.markets["addr0"].positions;
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].id, "11");
    }

    #[tokio::test]
    async fn test_position_details_skipped_when_no_ids() {
        let source = source_with_markets(1).await;
        // Details would fail, but there is nothing to fetch.
        source.fail("ETH_USD_0", FailurePoint::PositionDetails).await;
        let aggregator = MarketDataAggregator::new(source, "executor".to_string(), 1);

        let report = aggregator.aggregate().await.unwrap();
        assert_eq!(report.markets.len(), 1);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_call_sequence_per_market() {
        let mut source = crate::market::MockMarketDataSource::new();
        source
            .expect_list_markets()
            .times(1)
            .returning(|| Ok(vec!["BTC_USD".to_string()]));
        source
            .expect_market_info()
            .withf(|id| id == "BTC_USD")
            .times(1)
            .returning(|_| Ok("btc".to_string()));
        source
            .expect_market_status()
            .withf(|addr| addr == "btc")
            .times(1)
            .returning(|_| Ok(sample_status("10", "10", "0", "0")));
        source
            .expect_open_position_ids()
            .withf(|addr, owner| addr == "btc" && owner == "executor")
            .times(1)
            .returning(|_, _| Ok(Vec::new()));
        source.expect_position_details().times(0);

        let aggregator = MarketDataAggregator::new(Arc::new(source), "executor".to_string(), 1);
        let report = aggregator.aggregate().await.unwrap();
        assert!(report.markets["btc"].positions.is_empty());
    }
}
