//! Type definitions for decoded market, position and funding data.
//!
//! Numeric fields stay as the decimal strings the chain returns; they are
//! parsed when a market is evaluated so a malformed value only affects the
//! market it belongs to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::decimal::{parse_decimal, parse_optional_decimal, ParseDecimalError};

/// Side of a perpetual position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk parameters of a market as configured on chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub trading_fee_notional_size: String,
    pub trading_fee_counter_collateral: String,
    pub funding_rate_sensitivity: String,
    pub funding_rate_max_annualized: String,
    pub delta_neutrality_fee_sensitivity: String,
    pub delta_neutrality_fee_cap: String,
    pub borrow_fee_rate_min_annualized: String,
    pub borrow_fee_rate_max_annualized: String,
}

/// Live state of a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStatus {
    pub market_type: String,
    pub config: MarketConfig,
    pub long_notional: String,
    pub short_notional: String,
    pub long_usd: String,
    pub short_usd: String,
    pub long_funding: String,
    pub short_funding: String,
    pub borrow_fee: String,
}

/// An open position owned by the tracked executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub direction: Direction,
    #[serde(default)]
    pub liquidation_price: Option<String>,
    #[serde(default)]
    pub take_profit_price: Option<String>,
    pub entry_price: String,
    pub collateral: String,
    pub notional_size: String,
    pub leverage: String,
}

impl Position {
    /// Liquidation price, if one is set.
    pub fn liquidation_price(&self) -> Result<Option<f64>, ParseDecimalError> {
        parse_optional_decimal("liquidation_price", self.liquidation_price.as_deref())
    }

    /// Take-profit price, if one is set.
    pub fn take_profit_price(&self) -> Result<Option<f64>, ParseDecimalError> {
        parse_optional_decimal("take_profit_price", self.take_profit_price.as_deref())
    }
}

/// Everything known about one market for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub market_id: String,
    pub market_addr: String,
    pub status: MarketStatus,
    pub positions: Vec<Position>,
}

impl MarketSnapshot {
    /// Open positions in the given direction.
    pub fn positions_in(&self, direction: Direction) -> impl Iterator<Item = &Position> {
        self.positions
            .iter()
            .filter(move |p| p.direction == direction)
    }
}

/// Funding-rate history record as returned by the history source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRateRecord {
    pub timestamp: DateTime<Utc>,
    pub long_rate: String,
    pub short_rate: String,
}

/// A parsed funding-rate sample. A side is `None` when its string was
/// malformed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FundingRateSample {
    pub timestamp: DateTime<Utc>,
    pub long_rate: Option<f64>,
    pub short_rate: Option<f64>,
}

impl From<&FundingRateRecord> for FundingRateSample {
    fn from(record: &FundingRateRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            long_rate: parse_decimal("long_rate", &record.long_rate).ok(),
            short_rate: parse_decimal("short_rate", &record.short_rate).ok(),
        }
    }
}

/// Long and short funding-rate series, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FundingSeries {
    pub long: Vec<f64>,
    pub short: Vec<f64>,
    /// Individual values dropped because they failed to parse
    pub discarded: usize,
}

impl FundingSeries {
    /// Parse raw history records into per-side series.
    ///
    /// Records are ordered by timestamp first; a malformed value is dropped
    /// from its own side only.
    pub fn from_records(records: &[FundingRateRecord]) -> Self {
        let mut samples: Vec<FundingRateSample> =
            records.iter().map(FundingRateSample::from).collect();
        samples.sort_by_key(|s| s.timestamp);

        let mut series = FundingSeries::default();
        for sample in samples {
            match sample.long_rate {
                Some(rate) => series.long.push(rate),
                None => series.discarded += 1,
            }
            match sample.short_rate {
                Some(rate) => series.short.push(rate),
                None => series.discarded += 1,
            }
        }
        series
    }
}
