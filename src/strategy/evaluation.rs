//! Per-market evaluation: turns a snapshot and its funding-rate trends into
//! one candidate decision per direction.
//!
//! Profit is estimated against the funding rate that would exist after the
//! evaluator's own trade is added to the market, not the rate observed now.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::config::Config;
use crate::market::{Direction, MarketSnapshot};
use crate::utils::decimal::{parse_decimal, to_f64, ParseDecimalError};

use super::decision::{Action, MarketDecision};
use super::fees::{estimate_fee_percentage, FeeInputs};
use super::funding_model::{compute_funding_rates, FundingParams};
use super::profit::{estimate_profit, minimum_profitable_funding_rate, ProjectionPolicy};

/// Keeps the imbalance ratio defined for empty markets.
const IMBALANCE_EPSILON: f64 = 1e-9;

/// Evaluation assumptions, converted once from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationSettings {
    pub holding_hours: f64,
    pub leverage: f64,
    /// Collateral of the simulated trade; notional is this times leverage
    pub trade_size_usd: f64,
    pub ema_period: usize,
    pub history_window_hours: i64,
    pub projection: ProjectionPolicy,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl EvaluationSettings {
    pub fn from_config(config: &Config) -> Self {
        let ev = &config.evaluator;
        let pr = &config.projection;
        Self {
            holding_hours: to_f64(ev.holding_period_hours),
            leverage: to_f64(ev.evaluation_leverage),
            trade_size_usd: to_f64(ev.trade_size_usd),
            ema_period: ev.ema_period,
            history_window_hours: ev.history_window_hours,
            projection: ProjectionPolicy {
                strong_drift_threshold: to_f64(pr.strong_drift_threshold),
                strong_drift_adjustment: to_f64(pr.strong_drift_adjustment),
                mild_drift_adjustment: to_f64(pr.mild_drift_adjustment),
                reversion_threshold: to_f64(pr.reversion_threshold),
                reversion_adjustment: to_f64(pr.reversion_adjustment),
            },
        }
    }

    fn trade_notional(&self) -> f64 {
        self.trade_size_usd * self.leverage
    }
}

/// Smoothed funding rates of one market.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FundingTrend {
    pub ema_long: f64,
    pub ema_short: f64,
}

/// Parsed numeric view of a market snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MarketNumbers {
    long_rate: f64,
    short_rate: f64,
    long_usd: f64,
    short_usd: f64,
    long_notional: f64,
    short_notional: f64,
    borrow_fee: f64,
    fee_rate_notional: f64,
    fee_rate_counter: f64,
    funding: FundingParams,
}

impl TryFrom<&MarketSnapshot> for MarketNumbers {
    type Error = ParseDecimalError;

    fn try_from(snapshot: &MarketSnapshot) -> Result<Self, Self::Error> {
        let status = &snapshot.status;
        let config = &status.config;
        Ok(Self {
            long_rate: parse_decimal("long_funding", &status.long_funding)?,
            short_rate: parse_decimal("short_funding", &status.short_funding)?,
            long_usd: parse_decimal("long_usd", &status.long_usd)?,
            short_usd: parse_decimal("short_usd", &status.short_usd)?,
            long_notional: parse_decimal("long_notional", &status.long_notional)?,
            short_notional: parse_decimal("short_notional", &status.short_notional)?,
            borrow_fee: parse_decimal("borrow_fee", &status.borrow_fee)?,
            fee_rate_notional: parse_decimal(
                "trading_fee_notional_size",
                &config.trading_fee_notional_size,
            )?,
            fee_rate_counter: parse_decimal(
                "trading_fee_counter_collateral",
                &config.trading_fee_counter_collateral,
            )?,
            funding: FundingParams {
                sensitivity: parse_decimal(
                    "funding_rate_sensitivity",
                    &config.funding_rate_sensitivity,
                )?,
                max_annualized: parse_decimal(
                    "funding_rate_max_annualized",
                    &config.funding_rate_max_annualized,
                )?,
                delta_neutrality_fee_sensitivity: parse_decimal(
                    "delta_neutrality_fee_sensitivity",
                    &config.delta_neutrality_fee_sensitivity,
                )?,
                delta_neutrality_fee_cap: parse_decimal(
                    "delta_neutrality_fee_cap",
                    &config.delta_neutrality_fee_cap,
                )?,
            },
        })
    }
}

/// Produce the `[short, long]` candidate decisions for a market.
///
/// Both come back with [`Action::Ignore`]; the planner assigns the final
/// action.
pub fn evaluate_market(
    snapshot: &MarketSnapshot,
    trend: FundingTrend,
    settings: &EvaluationSettings,
    generation: u64,
    now: DateTime<Utc>,
) -> Result<[MarketDecision; 2], ParseDecimalError> {
    let m = MarketNumbers::try_from(snapshot)?;

    let open_interest = m.long_usd + m.short_usd;
    let imbalance_ratio =
        m.short_notional / (m.short_notional + m.long_notional + IMBALANCE_EPSILON);
    let trade_notional = settings.trade_notional();

    let decide = |direction: Direction| {
        let (current_rate, ema_rate, post_trade_rate) = match direction {
            Direction::Long => {
                let (long, _) = compute_funding_rates(
                    m.long_notional + trade_notional,
                    m.short_notional,
                    &m.funding,
                );
                (m.long_rate, trend.ema_long, long)
            }
            Direction::Short => {
                let (_, short) = compute_funding_rates(
                    m.long_notional,
                    m.short_notional + trade_notional,
                    &m.funding,
                );
                (m.short_rate, trend.ema_short, short)
            }
        };

        let projected_current = settings.projection.project(current_rate, ema_rate);
        let fee_estimate = estimate_fee_percentage(&FeeInputs {
            leverage: settings.leverage,
            fee_rate_notional: m.fee_rate_notional,
            fee_rate_counter: m.fee_rate_counter,
            borrow_rate_annualized: m.borrow_fee,
            funding_rate_annualized: projected_current,
            holding_hours: settings.holding_hours,
        });
        let profit_estimate = estimate_profit(post_trade_rate, settings.holding_hours, fee_estimate);

        trace!(
            market = %snapshot.market_addr,
            %direction,
            current_rate,
            ema_rate,
            projected_current,
            post_trade_rate,
            fee_estimate,
            profit_estimate,
            break_even_rate = minimum_profitable_funding_rate(settings.holding_hours, fee_estimate),
            "Evaluated direction"
        );

        MarketDecision {
            market_addr: snapshot.market_addr.clone(),
            market_id: snapshot.market_id.clone(),
            direction,
            profit_estimate,
            current_rate,
            ema_rate,
            projected_rate: post_trade_rate,
            fee_estimate,
            open_interest,
            imbalance_ratio,
            has_position: false,
            position_id: None,
            action: Action::Ignore,
            note: None,
            timestamp: now,
            generation,
        }
    };

    Ok([decide(Direction::Short), decide(Direction::Long)])
}
