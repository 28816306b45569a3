//! Delta-neutrality funding-rate model.
//!
//! The more crowded side pays, the less crowded side receives. Payments
//! balance in notional terms: the unpopular rate is the popular rate scaled
//! by the notional ratio. The sensitivity floor rises with total notional
//! relative to the delta-neutrality fee sensitivity × cap product.

use serde::{Deserialize, Serialize};

/// Market risk parameters used by the funding-rate model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundingParams {
    pub sensitivity: f64,
    pub max_annualized: f64,
    pub delta_neutrality_fee_sensitivity: f64,
    pub delta_neutrality_fee_cap: f64,
}

/// Annualized `(long_rate, short_rate)` for the given exposure.
///
/// Positive means the side pays. Zero total notional returns `(0, 0)`. The
/// popular rate is capped from above at `max_annualized` only; a negative
/// rate (shorts popular) is left as is. For a single-sided market the
/// popular rate is applied unscaled to the empty side.
pub fn compute_funding_rates(
    long_notional: f64,
    short_notional: f64,
    params: &FundingParams,
) -> (f64, f64) {
    let total = long_notional + short_notional;
    if total == 0.0 {
        return (0.0, 0.0);
    }

    let net_open_interest = long_notional - short_notional;
    let longs_popular = long_notional > short_notional;
    let (popular_notional, unpopular_notional) = if longs_popular {
        (long_notional, short_notional)
    } else {
        (short_notional, long_notional)
    };

    let fee_scale = params.delta_neutrality_fee_sensitivity * params.delta_neutrality_fee_cap;
    let effective_sensitivity = if fee_scale > 0.0 {
        let sensitivity_override = params.max_annualized * (total / fee_scale);
        sensitivity_override.max(params.sensitivity)
    } else {
        params.sensitivity
    };

    let raw_popular_rate = (net_open_interest / total) * effective_sensitivity;
    let popular_rate = raw_popular_rate.min(params.max_annualized);

    let unpopular_rate = if unpopular_notional == 0.0 {
        popular_rate
    } else {
        popular_rate * (popular_notional / unpopular_notional)
    };

    if longs_popular {
        (popular_rate, -unpopular_rate)
    } else {
        (unpopular_rate, -popular_rate)
    }
}
