//! Exponential moving average over a finite series.

use thiserror::Error;

/// Why an EMA could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EmaError {
    #[error("EMA period must be at least 1")]
    InvalidPeriod,

    #[error("need {required} samples for EMA, have {available}")]
    InsufficientSamples { required: usize, available: usize },
}

/// EMA of `values` (oldest first) with smoothing factor `2/(period+1)`.
///
/// The first `period` samples seed the average with their simple mean; each
/// later sample moves it by `alpha * (x - ema)`. A constant series returns
/// that constant exactly.
pub fn ema(values: &[f64], period: usize) -> Result<f64, EmaError> {
    if period == 0 {
        return Err(EmaError::InvalidPeriod);
    }
    if values.len() < period {
        return Err(EmaError::InsufficientSamples {
            required: period,
            available: values.len(),
        });
    }

    let (seed, rest) = values.split_at(period);

    // Running mean rather than sum / n so repeated values stay exact
    let mut value = 0.0;
    for (i, x) in seed.iter().enumerate() {
        value += (x - value) / (i + 1) as f64;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    for x in rest {
        value += alpha * (x - value);
    }

    Ok(value)
}
