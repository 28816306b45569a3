//! Per-market, per-direction trading decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::market::Direction;

/// What to do with a market/direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Open,
    Increase,
    Reduce,
    Hold,
    Close,
    /// Initial state of every decision before planning
    Ignore,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Open => "open",
            Action::Increase => "increase",
            Action::Reduce => "reduce",
            Action::Hold => "hold",
            Action::Close => "close",
            Action::Ignore => "ignore",
        };
        f.write_str(s)
    }
}

/// Why a held position should be closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloseReason {
    /// The funding rate for the position's side turned positive
    FundingPositive,
    LiquidationRisk,
    TakeProfit,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::FundingPositive => "funding-positive",
            CloseReason::LiquidationRisk => "liquidation-risk",
            CloseReason::TakeProfit => "take-profit",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluation of one side of one market for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDecision {
    pub market_addr: String,
    pub market_id: String,
    pub direction: Direction,
    /// Net profit over the holding period, fraction of notional
    pub profit_estimate: f64,
    pub current_rate: f64,
    pub ema_rate: f64,
    /// Funding rate after the evaluator's own trade is added to this side
    pub projected_rate: f64,
    pub fee_estimate: f64,
    /// Long + short USD value
    pub open_interest: f64,
    /// Short share of total notional
    pub imbalance_ratio: f64,
    pub has_position: bool,
    pub position_id: Option<String>,
    pub action: Action,
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Evaluation cycle that produced this decision
    pub generation: u64,
}

impl MarketDecision {
    /// Key used in the published decision map.
    pub fn key(&self) -> String {
        decision_key(&self.market_addr, self.direction)
    }
}

/// `"{market_addr}|{direction}"`.
pub fn decision_key(market_addr: &str, direction: Direction) -> String {
    format!("{}|{}", market_addr, direction)
}
