//! Configuration management for the funding evaluator.
//!
//! Loads settings from environment variables and config files.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Longest funding-history lookback accepted (one year).
pub const MAX_HISTORY_WINDOW_HOURS: i64 = 24 * 365;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Contract addresses
    #[serde(default)]
    pub chain: ChainConfig,
    /// Evaluation cycle parameters
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    /// Funding-rate projection thresholds
    #[serde(default)]
    pub projection: ProjectionConfig,
    /// Held-position lifecycle rules
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Market id -> price feed id
    #[serde(default)]
    pub price_feeds: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Factory contract listing all markets
    #[serde(default)]
    pub factory_address: String,
    /// Address whose open positions are tracked
    #[serde(default)]
    pub executor_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Seconds between refresh cycles
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Maximum markets fetched or evaluated at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Collateral of the simulated trade in USD
    #[serde(default = "default_trade_size")]
    pub trade_size_usd: Decimal,
    /// Leverage assumed for fee estimation and the simulated trade
    #[serde(default = "default_evaluation_leverage")]
    pub evaluation_leverage: Decimal,
    /// Assumed holding period for profit estimation
    #[serde(default = "default_holding_period")]
    pub holding_period_hours: Decimal,
    /// Samples in the EMA smoothing period
    #[serde(default = "default_ema_period")]
    pub ema_period: usize,
    /// Trailing window of funding history to fetch
    #[serde(default = "default_history_window")]
    pub history_window_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Drift (current - EMA) above which the strong adjustment applies
    #[serde(default = "default_strong_drift_threshold")]
    pub strong_drift_threshold: Decimal,
    #[serde(default = "default_strong_drift_adjustment")]
    pub strong_drift_adjustment: Decimal,
    /// Subtracted for a smaller positive drift
    #[serde(default = "default_mild_drift_adjustment")]
    pub mild_drift_adjustment: Decimal,
    /// Negative drift magnitude above which the rate is expected to recover
    #[serde(default = "default_reversion_threshold")]
    pub reversion_threshold: Decimal,
    #[serde(default = "default_reversion_adjustment")]
    pub reversion_adjustment: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Distance to liquidation / take-profit that closes a position (0.0-1.0)
    #[serde(default = "default_price_buffer")]
    pub price_buffer: Decimal,
    /// Relative deviation of rate from EMA that triggers increase / reduce
    #[serde(default = "default_rate_divergence")]
    pub rate_divergence: Decimal,
}

// Default value functions
fn default_refresh_interval() -> u64 {
    300
}

fn default_max_concurrency() -> usize {
    8
}

fn default_trade_size() -> Decimal {
    Decimal::new(100, 0) // $100 collateral
}

fn default_evaluation_leverage() -> Decimal {
    Decimal::new(3, 0) // 3x
}

fn default_holding_period() -> Decimal {
    Decimal::new(48, 0) // 48 hours
}

fn default_ema_period() -> usize {
    24 // hourly samples -> one day
}

fn default_history_window() -> i64 {
    24
}

fn default_strong_drift_threshold() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_strong_drift_adjustment() -> Decimal {
    Decimal::new(15, 3) // 0.015
}

fn default_mild_drift_adjustment() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_reversion_threshold() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_reversion_adjustment() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_price_buffer() -> Decimal {
    Decimal::new(5, 2) // 0.05 = within 5% of trigger price
}

fn default_rate_divergence() -> Decimal {
    Decimal::new(5, 1) // 0.5 = 50% away from EMA
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("FEV"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.evaluator.evaluation_leverage >= Decimal::ONE,
            "evaluation_leverage must be >= 1"
        );

        anyhow::ensure!(
            self.evaluator.holding_period_hours > Decimal::ZERO,
            "holding_period_hours must be positive"
        );

        anyhow::ensure!(
            self.evaluator.trade_size_usd > Decimal::ZERO,
            "trade_size_usd must be positive"
        );

        anyhow::ensure!(
            self.evaluator.refresh_interval_secs > 0,
            "refresh_interval_secs must be positive"
        );

        anyhow::ensure!(
            self.evaluator.max_concurrency >= 1,
            "max_concurrency must be at least 1"
        );

        anyhow::ensure!(self.evaluator.ema_period >= 1, "ema_period must be at least 1");

        anyhow::ensure!(
            self.evaluator.history_window_hours > 0
                && self.evaluator.history_window_hours <= MAX_HISTORY_WINDOW_HOURS,
            "history_window_hours must be between 1 and {}",
            MAX_HISTORY_WINDOW_HOURS
        );

        anyhow::ensure!(
            self.lifecycle.price_buffer >= Decimal::ZERO && self.lifecycle.price_buffer < Decimal::ONE,
            "price_buffer must be between 0 and 1"
        );

        anyhow::ensure!(
            self.lifecycle.rate_divergence > Decimal::ZERO,
            "rate_divergence must be positive"
        );

        anyhow::ensure!(
            self.projection.strong_drift_threshold >= Decimal::ZERO
                && self.projection.reversion_threshold >= Decimal::ZERO,
            "projection thresholds must not be negative"
        );

        Ok(())
    }
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            max_concurrency: default_max_concurrency(),
            trade_size_usd: default_trade_size(),
            evaluation_leverage: default_evaluation_leverage(),
            holding_period_hours: default_holding_period(),
            ema_period: default_ema_period(),
            history_window_hours: default_history_window(),
        }
    }
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            strong_drift_threshold: default_strong_drift_threshold(),
            strong_drift_adjustment: default_strong_drift_adjustment(),
            mild_drift_adjustment: default_mild_drift_adjustment(),
            reversion_threshold: default_reversion_threshold(),
            reversion_adjustment: default_reversion_adjustment(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            price_buffer: default_price_buffer(),
            rate_divergence: default_rate_divergence(),
        }
    }
}
