//! Per-market skip reasons.
//!
//! A market that cannot be evaluated in a cycle is not an error for the
//! cycle: it is recorded with one of these reasons and left out of the
//! published decisions until the next refresh.

use serde::Serialize;
use thiserror::Error;

use crate::strategy::EmaError;
use crate::utils::decimal::ParseDecimalError;

/// Why a market produced no decisions this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// No price feed is configured for the market id.
    #[error("no price feed configured")]
    NoPriceFeed,

    /// The oracle lookup failed.
    #[error("price unavailable: {0}")]
    PriceUnavailable(String),

    /// The funding-rate history fetch failed.
    #[error("funding history unavailable: {0}")]
    HistoryUnavailable(String),

    /// Fewer valid samples than the smoothing period on one side.
    #[error("insufficient funding history: {0}")]
    InsufficientHistory(String),

    /// A status or configuration field could not be parsed.
    #[error("unparseable market data: {0}")]
    Parse(String),

    /// The evaluation task panicked or was aborted.
    #[error("evaluation task failed: {0}")]
    TaskFailed(String),
}

impl From<ParseDecimalError> for SkipReason {
    fn from(err: ParseDecimalError) -> Self {
        SkipReason::Parse(err.to_string())
    }
}

impl From<EmaError> for SkipReason {
    fn from(err: EmaError) -> Self {
        SkipReason::InsufficientHistory(err.to_string())
    }
}
