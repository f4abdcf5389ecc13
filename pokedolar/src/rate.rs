//! Pure functions over the exchange-rate string: index derivation, the
//! idempotency gate and the rate movement between two publications.
//!
//! Rates are handled in their published form, with `,` as the only decimal
//! separator (`"5,23"`). A `.` is always read as a thousands separator and
//! dropped, so `"1.234,5"` and `"1234,5"` are the same rate.

use crate::types::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Split a rate into its integer and fractional digit runs, validating the shape.
fn split_digits(rate: &str) -> Result<(String, String)> {
    let malformed = || PipelineError::MalformedRate {
        rate: rate.to_string(),
    };

    let cleaned: String = rate.trim().chars().filter(|c| *c != '.').collect();
    let (int_part, frac_part) = match cleaned.split_once(',') {
        Some((int_part, frac_part)) => {
            if frac_part.is_empty() || frac_part.contains(',') {
                return Err(malformed());
            }
            (int_part, frac_part)
        }
        None => (cleaned.as_str(), ""),
    };

    if int_part.is_empty() {
        return Err(malformed());
    }
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(malformed());
    }

    Ok((int_part.to_string(), frac_part.to_string()))
}

/// Decimal places that make up the catalog index.
pub const INDEX_DECIMALS: usize = 2;

/// Map a rate string to a catalog index: the rate in whole cents.
///
/// The integer digits are followed by exactly two fractional digits, extra
/// ones truncated and missing ones zero-filled, so `"5,23"`, `"5,234"` and
/// `"5,2300"` are all entry 523, `"5,2"` is 520 and `"0,07"` is 7.
pub fn derive_index(rate: &str) -> Result<u32> {
    let (int_part, frac_part) = split_digits(rate)?;
    let cents: String = frac_part
        .chars()
        .chain(std::iter::repeat('0'))
        .take(INDEX_DECIMALS)
        .collect();
    format!("{}{}", int_part, cents)
        .parse::<u32>()
        .map_err(|_| PipelineError::MalformedRate {
            rate: rate.to_string(),
        })
}

/// Numeric value of a rate string, `"5,23"` is `5.23`.
pub fn parse_rate(rate: &str) -> Result<f64> {
    let (int_part, frac_part) = split_digits(rate)?;
    let normalized = if frac_part.is_empty() {
        int_part
    } else {
        format!("{}.{}", int_part, frac_part)
    };
    normalized
        .parse::<f64>()
        .map_err(|_| PipelineError::MalformedRate {
            rate: rate.to_string(),
        })
}

/// Idempotency gate: proceed unless the new rate is exactly the last published one.
pub fn should_proceed(last_rate: Option<&str>, new_rate: &str) -> bool {
    let proceed = match last_rate {
        None => true,
        Some(last) => last.trim() != new_rate.trim(),
    };
    debug!("Rate gate: last={:?} new={} proceed={}", last_rate, new_rate, proceed);
    proceed
}

/// Movement of the rate since the last publication.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateVariation {
    /// Absolute change, rounded half-up to two decimals.
    pub amount: f64,
    pub up: bool,
}

impl RateVariation {
    /// Compare against the last published rate; a missing one counts as zero.
    pub fn between(last_rate: Option<&str>, new_rate: &str) -> Result<Self> {
        let last = match last_rate {
            Some(last) => parse_rate(last)?,
            None => 0.0,
        };
        let new = parse_rate(new_rate)?;
        let amount = round_half_up_2((new - last).abs());

        Ok(Self {
            amount,
            up: new > last,
        })
    }

    /// `amount` in cents, rounded; `0.29` is 29, never 28.
    pub fn cents(&self) -> i64 {
        (self.amount * 100.0).round() as i64
    }

    /// Caption-facing wording, e.g. `"subiu 5 centavos"`.
    pub fn describe(&self) -> String {
        format!(
            "{} {} centavos",
            if self.up { "subiu" } else { "caiu" },
            self.cents()
        )
    }
}

fn round_half_up_2(value: f64) -> f64 {
    // Ties stored just below x.xx5 still round up.
    ((value * 100.0) + 1e-9).round() / 100.0
}
