//! Holding-cost estimate for a leveraged position.

/// Inputs to [`estimate_fee_percentage`]. Rates are annualized decimals
/// (`0.03` = 3% per year) except the two trading fees, which are one-off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeInputs {
    /// Must be at least 1
    pub leverage: f64,
    pub fee_rate_notional: f64,
    pub fee_rate_counter: f64,
    pub borrow_rate_annualized: f64,
    pub funding_rate_annualized: f64,
    pub holding_hours: f64,
}

/// Total cost of opening and holding the position, as a fraction of
/// notional: trading fee on notional, trading fee on counter collateral,
/// borrow fee and funding over the holding period.
pub fn estimate_fee_percentage(inputs: &FeeInputs) -> f64 {
    debug_assert!(inputs.leverage >= 1.0, "leverage below 1");

    let days_held = inputs.holding_hours / 24.0;

    let trading_fee_notional = inputs.fee_rate_notional;
    let trading_fee_counter = (inputs.leverage - 1.0) * inputs.fee_rate_counter;
    let borrow_fee =
        (1.0 - 1.0 / inputs.leverage) * (inputs.borrow_rate_annualized / 365.0) * days_held;
    let funding_fee = inputs.funding_rate_annualized / 365.0 * days_held;

    trading_fee_notional + trading_fee_counter + borrow_fee + funding_fee
}
