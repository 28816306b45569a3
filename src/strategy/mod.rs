//! Funding-rate evaluation and trading decisions.
//!
//! Contains the core logic for:
//! - Funding-rate, fee and profit models
//! - Per-market evaluation into long/short candidate decisions
//! - The periodic evaluator and its published state
//! - Ranking opportunities and held-position adjustments

mod decision;
mod ema;
mod evaluation;
mod evaluator;
mod fees;
mod funding_model;
mod planner;
mod profit;

pub use decision::{decision_key, Action, CloseReason, MarketDecision};
pub use ema::{ema, EmaError};
pub use evaluation::{evaluate_market, EvaluationSettings, FundingTrend};
pub use evaluator::{CycleReport, Evaluator, MarketOutcome, PublishedState};
pub use fees::{estimate_fee_percentage, FeeInputs};
pub use funding_model::{compute_funding_rates, FundingParams};
pub use planner::{plan_decisions, DecisionView};
pub use profit::{estimate_profit, minimum_profitable_funding_rate, ProjectionPolicy};
