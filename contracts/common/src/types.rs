//! Core Types for the Chamber Protocol
//!
//! Identities and the elastic/base accounting pair shared by the vault
//! (amount vs. share) and the market (debt amount vs. borrow part).

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::ChamberResult;
use crate::math::{mul_div, safe_add, safe_sub};

/// Type alias for account identities (20-byte, recoverable from a signature)
pub type Address = [u8; 20];

/// Type alias for asset identifiers
pub type AssetId = [u8; 20];

/// Seconds since the epoch, as supplied by the hosting environment
pub type Timestamp = u64;

/// Zero address, never a valid owner
pub const ZERO_ADDRESS: Address = [0u8; 20];

// ============ Rebase ============

/// An `elastic` quantity divided into `base` units.
///
/// In the vault `elastic` is the amount of tokens held and `base` the shares
/// issued; in a market `elastic` is the debt owed and `base` the borrow
/// parts. Both are zero together or non-zero together.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Rebase {
    /// Total underlying quantity
    pub elastic: u128,
    /// Total units issued against it
    pub base: u128,
}

impl Rebase {
    /// Convert an elastic quantity to base units at the current ratio.
    /// An empty rebase converts 1:1.
    pub fn to_base(&self, elastic: u128, round_up: bool) -> ChamberResult<u128> {
        if self.elastic == 0 {
            return Ok(elastic);
        }
        mul_div(elastic, self.base, self.elastic, round_up)
    }

    /// Convert base units to the elastic quantity at the current ratio.
    /// An empty rebase converts 1:1.
    pub fn to_elastic(&self, base: u128, round_up: bool) -> ChamberResult<u128> {
        if self.base == 0 {
            return Ok(base);
        }
        mul_div(base, self.elastic, self.base, round_up)
    }

    /// Add `elastic` and the matching base units; returns the base added
    pub fn add(&mut self, elastic: u128, round_up: bool) -> ChamberResult<u128> {
        let base = self.to_base(elastic, round_up)?;
        self.add_both(elastic, base)?;
        Ok(base)
    }

    /// Remove `base` units and the matching elastic; returns the elastic removed
    pub fn sub(&mut self, base: u128, round_up: bool) -> ChamberResult<u128> {
        let elastic = self.to_elastic(base, round_up)?;
        self.sub_both(elastic, base)?;
        Ok(elastic)
    }

    /// Add both quantities verbatim
    pub fn add_both(&mut self, elastic: u128, base: u128) -> ChamberResult<()> {
        let new_elastic = safe_add(self.elastic, elastic)?;
        let new_base = safe_add(self.base, base)?;
        self.elastic = new_elastic;
        self.base = new_base;
        Ok(())
    }

    /// Remove both quantities verbatim
    pub fn sub_both(&mut self, elastic: u128, base: u128) -> ChamberResult<()> {
        let new_elastic = safe_sub(self.elastic, elastic)?;
        let new_base = safe_sub(self.base, base)?;
        self.elastic = new_elastic;
        self.base = new_base;
        Ok(())
    }

    /// Grow the elastic side without issuing base units (interest, yield)
    pub fn add_elastic(&mut self, elastic: u128) -> ChamberResult<()> {
        self.elastic = safe_add(self.elastic, elastic)?;
        Ok(())
    }

    /// True when nothing has been issued
    pub fn is_empty(&self) -> bool {
        self.elastic == 0 && self.base == 0
    }
}
