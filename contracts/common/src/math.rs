//! Mathematical Utilities for the Chamber Protocol
//!
//! Checked fixed-point helpers. Products of two 18-decimal quantities do not
//! fit in `u128`, so intermediates are widened to 256 bits and narrowed back
//! with an explicit overflow check.

use ethereum_types::U256;

use crate::constants::{fees, precision, time};
use crate::errors::{ChamberError, ChamberResult};

/// Narrow a 256-bit intermediate back to `u128`
pub fn narrow(value: U256) -> ChamberResult<u128> {
    if value.bits() > 128 {
        return Err(ChamberError::ArithmeticOverflow);
    }
    Ok(value.low_u128())
}

/// Compute `a * b / denominator`, rounding up when `round_up` is set and the
/// division leaves a remainder.
pub fn mul_div(a: u128, b: u128, denominator: u128, round_up: bool) -> ChamberResult<u128> {
    if denominator == 0 {
        return Err(ChamberError::DivisionByZero);
    }
    // a, b < 2^128 so the product always fits in 256 bits
    let product = U256::from(a) * U256::from(b);
    let denominator = U256::from(denominator);
    let mut quotient = product / denominator;
    if round_up && !(product % denominator).is_zero() {
        quotient = quotient
            .checked_add(U256::one())
            .ok_or(ChamberError::ArithmeticOverflow)?;
    }
    narrow(quotient)
}

/// Value of `amount` collateral at `exchange_rate` (1e18 scale), truncated
pub fn collateral_value(amount: u128, exchange_rate: u128) -> ChamberResult<u128> {
    mul_div(amount, exchange_rate, precision::EXCHANGE_RATE_PRECISION, false)
}

/// Interest owed on `elastic` after `elapsed` seconds at `rate_per_second`
///
/// `interest = elastic * rate_per_second * elapsed / 1e18`, truncated.
pub fn interest_due(elastic: u128, rate_per_second: u64, elapsed: u64) -> ChamberResult<u128> {
    let rate_times_elapsed = (rate_per_second as u128)
        .checked_mul(elapsed as u128)
        .ok_or(ChamberError::ArithmeticOverflow)?;
    mul_div(elastic, rate_times_elapsed, precision::INTEREST_PRECISION, false)
}

/// Opening fee charged on a fresh borrow of `amount`
pub fn opening_fee(amount: u128, opening_fee_bps: u64) -> ChamberResult<u128> {
    mul_div(amount, opening_fee_bps as u128, fees::BPS_DENOMINATOR, false)
}

/// Convert an annual percentage rate in basis points to a per-second rate
/// at 1e18 precision (truncated).
pub fn interest_per_second_from_apr_bps(apr_bps: u64) -> u64 {
    let per_year = (apr_bps as u128) * precision::INTEREST_PRECISION / fees::BPS_DENOMINATOR;
    (per_year / time::SECONDS_PER_YEAR as u128).min(u64::MAX as u128) as u64
}

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> ChamberResult<u128> {
    a.checked_add(b).ok_or(ChamberError::ArithmeticOverflow)
}

/// Safe subtraction, reported as an insufficient balance
pub fn safe_sub(a: u128, b: u128) -> ChamberResult<u128> {
    a.checked_sub(b).ok_or(ChamberError::InsufficientBalance {
        available: a,
        requested: b,
    })
}
