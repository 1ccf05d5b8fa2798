//! Interest and Solvency Engine
//!
//! Debt is a `Rebase` of owed amount (`elastic`) over borrow parts (`base`).
//! Accruing interest grows `elastic` only, so every position's share of the
//! debt compounds at once. The same interest is credited to the fee
//! accumulator, which is later settled to the fee sink.

use borsh::{BorshDeserialize, BorshSerialize};
use ethereum_types::U256;
use serde::{Deserialize, Serialize};

use chamber_common::{
    constants::{fees::BPS_DENOMINATOR, precision::EXCHANGE_RATE_PRECISION},
    errors::ChamberResult,
    math::{interest_due, safe_add},
    types::{Rebase, Timestamp},
};

/// Accrual clock and fee accumulator
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct AccrueInfo {
    pub last_accrued: Timestamp,
    /// Debt-asset amount owed to the fee sink, not yet settled
    pub fees_earned: u128,
    /// Per-second interest rate at 1e18 precision
    pub interest_per_second: u64,
}

/// Advance the accrual clock to `now`, compounding `total_borrow`.
///
/// Returns the interest added. A clock that does not move, or a market with
/// no debt, adds nothing.
pub fn accrue(total_borrow: &mut Rebase, info: &mut AccrueInfo, now: Timestamp) -> ChamberResult<u128> {
    let elapsed = now.saturating_sub(info.last_accrued);
    if elapsed == 0 {
        return Ok(0);
    }
    if total_borrow.base == 0 {
        info.last_accrued = now;
        return Ok(0);
    }

    let extra = interest_due(total_borrow.elastic, info.interest_per_second, elapsed)?;
    let fees_earned = safe_add(info.fees_earned, extra)?;
    total_borrow.add_elastic(extra)?;
    info.fees_earned = fees_earned;
    info.last_accrued = now;
    Ok(extra)
}

/// Collateralization invariant.
///
/// Solvent iff `collateral_amount * exchange_rate / 1e18 * collateralization_bps
/// >= debt_amount * 10000`. Evaluated without intermediate truncation.
pub fn is_solvent(
    collateral_amount: u128,
    debt_amount: u128,
    exchange_rate: u128,
    collateralization_bps: u64,
) -> bool {
    if debt_amount == 0 {
        return true;
    }
    // Products past 256 bits saturate
    let collateral_side = U256::from(collateral_amount)
        .saturating_mul(U256::from(exchange_rate))
        .saturating_mul(U256::from(collateralization_bps));
    let debt_side = U256::from(debt_amount)
        .saturating_mul(U256::from(EXCHANGE_RATE_PRECISION))
        .saturating_mul(U256::from(BPS_DENOMINATOR));
    collateral_side >= debt_side
}
