//! Exchange Rate Oracle
//!
//! Markets read prices through the `Oracle` trait and cache the result. A
//! rate is always "debt asset per one unit of collateral" at 1e18 precision.
//!
//! ## Feed Adapter
//!
//! `FeedOracle` wraps an operator-pushed price feed:
//! - Only the operator can push a new answer
//! - Answers older than `max_age` seconds are reported as failed reads
//! - Answers are normalized from the feed's decimals to the 1e18 scale

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::debug;

use chamber_common::{
    errors::{ChamberError, ChamberResult},
    types::{Address, Timestamp},
};

/// Decimals of the normalized rate
pub const RATE_DECIMALS: u8 = 18;

// ============ Oracle Interface ============

/// Price source consumed by a market.
///
/// `data` is the market's opaque oracle configuration, passed back on every
/// read. Each read returns `(success, rate)`; on failure the rate is the
/// source's best effort and must not be trusted.
pub trait Oracle {
    /// Read and refresh the rate
    fn get(&mut self, data: &[u8], now: Timestamp) -> (bool, u128);

    /// Read the rate without side effects
    fn peek(&self, data: &[u8], now: Timestamp) -> (bool, u128);
}

// ============ Feed Adapter ============

/// Operator-pushed feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct FeedOracle {
    /// Last pushed answer in the feed's own decimals
    pub answer: u128,
    /// Decimals of `answer`
    pub decimals: u8,
    /// When `answer` was pushed
    pub updated_at: Timestamp,
    /// Maximum age in seconds before the answer counts as stale
    pub max_age: u64,
    /// Authorized operator (can push answers)
    pub operator: Address,
    /// Admin (can change operator)
    pub admin: Address,
    /// Whether the feed is serving answers
    pub is_active: bool,
    /// Last successfully served rate (fallback for failed reads)
    pub last_good_rate: u128,
}

impl FeedOracle {
    /// Create a feed with an initial answer
    pub fn new(
        admin: Address,
        operator: Address,
        answer: u128,
        decimals: u8,
        max_age: u64,
        now: Timestamp,
    ) -> Self {
        Self {
            answer,
            decimals,
            updated_at: now,
            max_age,
            operator,
            admin,
            is_active: true,
            last_good_rate: normalize_rate(answer, decimals).unwrap_or(0),
        }
    }

    /// Push a new answer
    pub fn push_answer(&mut self, signer: &Address, answer: u128, now: Timestamp) -> ChamberResult<()> {
        // 1. Only operator can update
        if *signer != self.operator {
            return Err(ChamberError::Unauthorized {
                owner: self.operator,
                caller: *signer,
            });
        }

        // 2. Answer must be positive and representable at 1e18
        if answer == 0 {
            return Err(ChamberError::InvalidInput {
                param: "answer",
                reason: "cannot be zero",
            });
        }
        normalize_rate(answer, self.decimals)?;

        // 3. Pushes cannot go back in time
        if now < self.updated_at {
            return Err(ChamberError::InvalidInput {
                param: "now",
                reason: "older than last update",
            });
        }

        debug!(answer, now, "feed answer pushed");
        self.answer = answer;
        self.updated_at = now;
        Ok(())
    }

    /// Change operator
    pub fn set_operator(&mut self, signer: &Address, operator: Address) -> ChamberResult<()> {
        if *signer != self.admin {
            return Err(ChamberError::OwnerOnly);
        }
        if operator == self.operator {
            return Err(ChamberError::InvalidInput {
                param: "operator",
                reason: "same as current",
            });
        }
        self.operator = operator;
        Ok(())
    }

    /// Pause or resume the feed
    pub fn set_active(&mut self, signer: &Address, is_active: bool) -> ChamberResult<()> {
        if *signer != self.admin {
            return Err(ChamberError::OwnerOnly);
        }
        self.is_active = is_active;
        Ok(())
    }

    /// Whether the answer is recent enough to serve
    pub fn is_fresh(&self, now: Timestamp) -> bool {
        self.is_active && now.saturating_sub(self.updated_at) <= self.max_age
    }

    fn read(&self, now: Timestamp) -> (bool, u128) {
        if !self.is_fresh(now) {
            return (false, self.last_good_rate);
        }
        match normalize_rate(self.answer, self.decimals) {
            Ok(rate) => (true, rate),
            Err(_) => (false, self.last_good_rate),
        }
    }
}

impl Oracle for FeedOracle {
    fn get(&mut self, _data: &[u8], now: Timestamp) -> (bool, u128) {
        let (success, rate) = self.read(now);
        if success {
            self.last_good_rate = rate;
        }
        (success, rate)
    }

    fn peek(&self, _data: &[u8], now: Timestamp) -> (bool, u128) {
        self.read(now)
    }
}

// ============ Helper Functions ============

/// Scale a feed answer from `decimals` to the 1e18 rate scale
pub fn normalize_rate(answer: u128, decimals: u8) -> ChamberResult<u128> {
    if decimals == RATE_DECIMALS {
        return Ok(answer);
    }
    if decimals > RATE_DECIMALS {
        let divisor = pow10(decimals - RATE_DECIMALS)?;
        Ok(answer / divisor)
    } else {
        let multiplier = pow10(RATE_DECIMALS - decimals)?;
        answer
            .checked_mul(multiplier)
            .ok_or(ChamberError::ArithmeticOverflow)
    }
}

fn pow10(exponent: u8) -> ChamberResult<u128> {
    10u128
        .checked_pow(u32::from(exponent))
        .ok_or(ChamberError::ArithmeticOverflow)
}

// ============ Tests ============
