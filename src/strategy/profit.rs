//! Profit estimate and funding-rate projection.

use serde::{Deserialize, Serialize};

const HOURS_PER_YEAR: f64 = 8760.0;

/// Net profit over the holding period as a fraction of notional.
///
/// A negative funding rate is income for the side holding it.
pub fn estimate_profit(funding_rate_annualized: f64, holding_hours: f64, entry_fee: f64) -> f64 {
    -funding_rate_annualized * (holding_hours / HOURS_PER_YEAR) - entry_fee
}

/// Annualized funding rate at which [`estimate_profit`] breaks even.
pub fn minimum_profitable_funding_rate(holding_hours: f64, entry_fee: f64) -> f64 {
    -entry_fee * (HOURS_PER_YEAR / holding_hours)
}

/// Mean-reversion heuristic applied to the current funding rate.
///
/// Rates above their trend are expected to fall back, rates well below it
/// to recover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionPolicy {
    /// Drift above which `strong_drift_adjustment` is subtracted
    pub strong_drift_threshold: f64,
    pub strong_drift_adjustment: f64,
    /// Subtracted for any smaller positive drift
    pub mild_drift_adjustment: f64,
    /// Negative drift beyond `-reversion_threshold` adds `reversion_adjustment`
    pub reversion_threshold: f64,
    pub reversion_adjustment: f64,
}

impl Default for ProjectionPolicy {
    fn default() -> Self {
        Self {
            strong_drift_threshold: 0.01,
            strong_drift_adjustment: 0.015,
            mild_drift_adjustment: 0.01,
            reversion_threshold: 0.01,
            reversion_adjustment: 0.01,
        }
    }
}

impl ProjectionPolicy {
    /// Project `current` given its trend `ema`.
    pub fn project(&self, current: f64, ema: f64) -> f64 {
        let drift = current - ema;
        if drift > self.strong_drift_threshold {
            current - self.strong_drift_adjustment
        } else if drift > 0.0 {
            current - self.mild_drift_adjustment
        } else if drift < -self.reversion_threshold {
            current + self.reversion_adjustment
        } else {
            current
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_profit() {
        // Receiving 87.6% a year for 48h = 0.0048, minus 0.003 fees
        let profit = estimate_profit(-0.876, 48.0, 0.003);
        assert!((profit - 0.0018).abs() < 1e-12);

        assert!(estimate_profit(0.1, 48.0, 0.0) < 0.0);
    }

    #[test]
    fn test_minimum_profitable_rate_breaks_even() {
        let rate = minimum_profitable_funding_rate(48.0, 0.003);
        assert!((rate + 0.5475).abs() < 1e-12);
        assert!(estimate_profit(rate, 48.0, 0.003).abs() < 1e-12);
    }

    #[test]
    fn test_projection_branches() {
        let policy = ProjectionPolicy::default();
        assert!((policy.project(0.10, 0.05) - 0.085).abs() < 1e-12);
        assert!((policy.project(0.10, 0.095) - 0.09).abs() < 1e-12);
        assert!((policy.project(0.0, 0.05) - 0.01).abs() < 1e-12);
        assert_eq!(policy.project(0.10, 0.105), 0.10);
        assert_eq!(policy.project(0.10, 0.10), 0.10);
    }

    #[test]
    fn test_projection_thresholds_configurable() {
        let policy = ProjectionPolicy {
            strong_drift_threshold: 0.5,
            ..ProjectionPolicy::default()
        };
        // 0.05 drift is now only mild
        assert!((policy.project(0.10, 0.05) - 0.09).abs() < 1e-12);
    }
}
