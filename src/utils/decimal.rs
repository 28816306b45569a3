//! Decimal helpers for values decoded from chain queries.
//!
//! Market status, configuration and funding history arrive as decimal
//! strings with up to 18 fractional digits. They are parsed through
//! `rust_decimal` (so malformed input is rejected rather than silently
//! truncated) and handed to the models as `f64`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// A decimal string that could not be turned into a finite `f64`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid decimal {field} = {value:?}")]
pub struct ParseDecimalError {
    pub field: &'static str,
    pub value: String,
}

/// Parse a chain decimal string.
///
/// `field` only labels the error. Surrounding whitespace is ignored; an
/// empty string is an error, not zero.
pub fn parse_decimal(field: &'static str, raw: &str) -> Result<f64, ParseDecimalError> {
    let err = || ParseDecimalError {
        field,
        value: raw.to_string(),
    };

    let trimmed = raw.trim();
    let decimal = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| err())?;

    decimal
        .to_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(err)
}

/// Parse an optional decimal string, treating an absent value as `None`.
pub fn parse_optional_decimal(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<f64>, ParseDecimalError> {
    raw.map(|r| parse_decimal(field, r)).transpose()
}

/// Convert a configuration decimal to `f64`.
pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}
