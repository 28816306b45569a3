//! Market data access.
//!
//! - Decoded market, position and funding-history types
//! - Collaborator traits for the chain, price oracle and history source
//! - Concurrent aggregation of every market into a point-in-time snapshot
//! - An in-memory mock source for paper runs and tests

mod aggregator;
pub mod mock;
mod traits;
mod types;

pub use aggregator::{AggregateReport, MarketDataAggregator, MarketFailure};
pub use mock::MockMarketSource;
pub use traits::{FundingHistorySource, MarketDataSource, PriceOracle};

#[cfg(test)]
pub(crate) use traits::MockMarketDataSource;
pub use types::*;
