//! Lifecycle rules for held positions.
//!
//! Each cycle re-derives the action for every held position from current
//! inputs only; nothing is remembered between cycles.

use tracing::trace;

use crate::config::LifecycleConfig;
use crate::market::{Direction, Position};
use crate::strategy::{Action, CloseReason};
use crate::utils::decimal::{to_f64, ParseDecimalError};

/// Price levels of a held position that trigger an exit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionLevels {
    pub direction: Direction,
    pub liquidation_price: Option<f64>,
    pub take_profit_price: Option<f64>,
}

impl TryFrom<&Position> for PositionLevels {
    type Error = ParseDecimalError;

    fn try_from(position: &Position) -> Result<Self, Self::Error> {
        Ok(Self {
            direction: position.direction,
            liquidation_price: position.liquidation_price()?,
            take_profit_price: position.take_profit_price()?,
        })
    }
}

/// Outcome for one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advice {
    /// One of close, increase, reduce or hold
    pub action: Action,
    pub reason: Option<CloseReason>,
}

impl Advice {
    fn close(reason: CloseReason) -> Self {
        Self {
            action: Action::Close,
            reason: Some(reason),
        }
    }

    fn keep(action: Action) -> Self {
        Self {
            action,
            reason: None,
        }
    }
}

/// Decides close / hold / increase / reduce for held positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionAdvisor {
    /// Fractional distance to a trigger price that counts as "at" it
    price_buffer: f64,
    /// Relative deviation of the current rate from its EMA that triggers
    /// increase / reduce
    rate_divergence: f64,
}

impl Default for PositionAdvisor {
    fn default() -> Self {
        Self::new(0.05, 0.5)
    }
}

impl PositionAdvisor {
    pub fn new(price_buffer: f64, rate_divergence: f64) -> Self {
        Self {
            price_buffer,
            rate_divergence,
        }
    }

    pub fn from_config(config: &LifecycleConfig) -> Self {
        Self::new(to_f64(config.price_buffer), to_f64(config.rate_divergence))
    }

    /// Evaluate a position against its side's current funding rate, the
    /// rate's EMA and the current price.
    ///
    /// Rules apply in order: positive funding, liquidation proximity,
    /// take-profit proximity, then rate divergence from trend.
    pub fn advise(
        &self,
        levels: &PositionLevels,
        current_rate: f64,
        ema_rate: f64,
        price: f64,
    ) -> Advice {
        if current_rate > 0.0 {
            return Advice::close(CloseReason::FundingPositive);
        }

        if let Some(liq) = levels.liquidation_price.filter(|p| *p > 0.0) {
            let distance = match levels.direction {
                Direction::Long => (price - liq) / liq,
                Direction::Short => (liq - price) / liq,
            };
            if distance <= self.price_buffer {
                trace!(direction = %levels.direction, liq, price, distance, "Near liquidation");
                return Advice::close(CloseReason::LiquidationRisk);
            }
        }

        if let Some(tp) = levels.take_profit_price.filter(|p| *p > 0.0) {
            let distance = match levels.direction {
                Direction::Long => (tp - price) / tp,
                Direction::Short => (price - tp) / tp,
            };
            if distance <= self.price_buffer {
                trace!(direction = %levels.direction, tp, price, distance, "Near take-profit");
                return Advice::close(CloseReason::TakeProfit);
            }
        }

        // A flat trend gives no signal
        let percent_diff = if ema_rate == 0.0 {
            0.0
        } else {
            (current_rate - ema_rate) / ema_rate.abs()
        };

        if percent_diff < -self.rate_divergence {
            Advice::keep(Action::Increase)
        } else if percent_diff > self.rate_divergence {
            Advice::keep(Action::Reduce)
        } else {
            Advice::keep(Action::Hold)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(direction: Direction, liq: Option<f64>, tp: Option<f64>) -> PositionLevels {
        PositionLevels {
            direction,
            liquidation_price: liq,
            take_profit_price: tp,
        }
    }

    #[test]
    fn test_liquidation_buffer_boundary_long() {
        let advisor = PositionAdvisor::default();
        let long = levels(Direction::Long, Some(90.0), None);

        let at_boundary = advisor.advise(&long, -0.1, -0.1, 94.5);
        assert_eq!(at_boundary, Advice::close(CloseReason::LiquidationRisk));

        let outside = advisor.advise(&long, -0.1, -0.1, 94.51);
        assert_eq!(outside.action, Action::Hold);
    }

    #[test]
    fn test_liquidation_buffer_short() {
        let advisor = PositionAdvisor::default();
        let short = levels(Direction::Short, Some(100.0), None);

        assert_eq!(
            advisor.advise(&short, -0.1, -0.1, 96.0).reason,
            Some(CloseReason::LiquidationRisk)
        );
        assert_eq!(advisor.advise(&short, -0.1, -0.1, 90.0).action, Action::Hold);
    }

    #[test]
    fn test_take_profit_mirrored() {
        let advisor = PositionAdvisor::default();

        let long = levels(Direction::Long, None, Some(200.0));
        assert_eq!(
            advisor.advise(&long, -0.1, -0.1, 191.0).reason,
            Some(CloseReason::TakeProfit)
        );
        assert_eq!(advisor.advise(&long, -0.1, -0.1, 150.0).action, Action::Hold);

        let short = levels(Direction::Short, None, Some(50.0));
        assert_eq!(
            advisor.advise(&short, -0.1, -0.1, 52.0).reason,
            Some(CloseReason::TakeProfit)
        );
        assert_eq!(advisor.advise(&short, -0.1, -0.1, 60.0).action, Action::Hold);
    }

    #[test]
    fn test_funding_positive_overrides_everything() {
        let advisor = PositionAdvisor::default();
        for direction in [Direction::Long, Direction::Short] {
            // Price sits right on both trigger levels
            let l = levels(direction, Some(100.0), Some(100.0));
            let advice = advisor.advise(&l, 0.0001, -0.2, 100.0);
            assert_eq!(advice, Advice::close(CloseReason::FundingPositive));
        }
    }

    #[test]
    fn test_rate_divergence() {
        let advisor = PositionAdvisor::default();
        let l = levels(Direction::Long, None, None);

        // (-0.3 - -0.1) / 0.1 = -2 -> more income than trend
        assert_eq!(advisor.advise(&l, -0.3, -0.1, 100.0).action, Action::Increase);
        // (-0.01 - -0.1) / 0.1 = 0.9 -> income fading
        assert_eq!(advisor.advise(&l, -0.01, -0.1, 100.0).action, Action::Reduce);
        // (-0.12 - -0.1) / 0.1 = -0.2
        assert_eq!(advisor.advise(&l, -0.12, -0.1, 100.0).action, Action::Hold);
    }

    #[test]
    fn test_zero_ema_holds() {
        let advisor = PositionAdvisor::default();
        let l = levels(Direction::Short, None, None);
        assert_eq!(advisor.advise(&l, -0.2, 0.0, 100.0).action, Action::Hold);
    }

    #[test]
    fn test_levels_from_position() {
        let mut position = crate::market::mock::sample_position("1", Direction::Long);
        position.liquidation_price = Some("90".to_string());
        let levels = PositionLevels::try_from(&position).unwrap();
        assert_eq!(levels.liquidation_price, Some(90.0));

        position.take_profit_price = Some("n/a".to_string());
        assert!(PositionLevels::try_from(&position).is_err());
    }
}
