//! Chamber Market - Collateralized Debt Positions over a Shared Vault
//!
//! A market lends one debt asset against one collateral asset. Collateral is
//! held as vault shares in the market's vault account; debt is tracked in
//! borrow parts of a compounding total.
//!
//! ## Core Operations
//!
//! - **add_collateral / remove_collateral**: move collateral shares in and out
//!   of a position
//! - **borrow**: open debt (plus a one-time opening fee) and send the debt
//!   asset as vault shares
//! - **repay**: burn borrow parts against debt-asset shares
//! - **accrue**: compound outstanding debt up to the current time
//! - **update_exchange_rate**: refresh the cached collateral rate from the oracle
//!
//! ## Administration
//!
//! - **set_fee_to / withdraw_fees**: settle accrued interest and opening fees
//!   to a single fee sink
//! - **change_interest_rate**: owner-set rate, accrued at the old rate first
//! - **reduce_supply**: owner takes back unborrowed debt asset
//!
//! Every mutation is normally submitted through the `cook` interpreter, which
//! runs a batch atomically and checks solvency before committing.

pub mod action;
pub mod cook;
pub mod interest;

#[cfg(test)]
mod integration_tests;

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use chamber_common::{
    constants::fees::{MAX_COLLATERALIZATION_BPS, MAX_OPENING_FEE_BPS},
    errors::{ChamberError, ChamberResult},
    events::{ChamberEvent, EventLog},
    math::{opening_fee, safe_add, safe_sub},
    types::{Address, AssetId, Rebase, Timestamp, ZERO_ADDRESS},
};
use chamber_oracle::Oracle;
use chamber_vault::{TokenCustody, VaultLedger};

pub use action::{Action, Num, StepResult};
pub use cook::{cook, Batch, CallTarget, CookOutcome, NoCallTarget};
pub use interest::AccrueInfo;

// ============ Configuration ============

/// Market initialization payload, consumed once
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct MarketInitParams {
    pub collateral: AssetId,
    /// Oracle the market reads its rate from
    pub oracle: Address,
    /// Opaque configuration passed to the oracle on every read
    pub oracle_data: Vec<u8>,
    pub interest_per_second: u64,
    /// Threshold used by external liquidators
    pub liquidation_bps: u64,
    /// Maximum debt as a share of collateral value
    pub collateralization_bps: u64,
    /// One-time fee added to each borrow
    pub opening_fee_bps: u64,
}

impl MarketInitParams {
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(data: &[u8]) -> ChamberResult<Self> {
        borsh::from_slice(data).map_err(|_| ChamberError::InvalidInput {
            param: "init_data",
            reason: "malformed market parameters",
        })
    }

    fn validate(&self) -> ChamberResult<()> {
        if self.collateral == ZERO_ADDRESS {
            return Err(ChamberError::InvalidInput {
                param: "collateral",
                reason: "cannot be zero address",
            });
        }
        if self.liquidation_bps == 0 {
            return Err(ChamberError::InvalidInput {
                param: "liquidation_bps",
                reason: "cannot be zero",
            });
        }
        if self.collateralization_bps == 0 || self.collateralization_bps > MAX_COLLATERALIZATION_BPS {
            return Err(ChamberError::InvalidInput {
                param: "collateralization_bps",
                reason: "must be in (0, 10000]",
            });
        }
        if self.opening_fee_bps > MAX_OPENING_FEE_BPS {
            return Err(ChamberError::InvalidInput {
                param: "opening_fee_bps",
                reason: "above maximum",
            });
        }
        Ok(())
    }
}

// ============ State ============

/// Per-user position
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct UserPosition {
    pub collateral_share: u128,
    pub borrow_part: u128,
}

/// Global market totals
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct MarketState {
    pub total_collateral_share: u128,
    /// Debt owed (`elastic`) over borrow parts (`base`)
    pub total_borrow: Rebase,
    pub accrue_info: AccrueInfo,
    /// Debt asset per unit of collateral at 1e18, as last read from the oracle
    pub exchange_rate: u128,
    pub fee_to: Address,
}

/// Read-only view of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionView {
    pub collateral_share: u128,
    pub collateral_amount: u128,
    pub borrow_part: u128,
    pub debt_amount: u128,
    /// Collateral priced in the debt asset at the cached rate
    pub collateral_value: u128,
}

/// Solvency status of a position under the cached rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionHealth {
    pub solvent: bool,
    pub liquidatable: bool,
    /// Liquidation threshold handed to external liquidators
    pub liquidation_bps: u64,
    /// Rate the next exchange-rate update would cache, if the oracle serves one
    pub pending_rate: Option<u128>,
}

// ============ Market ============

/// A single-collateral, single-debt-asset market
#[derive(Debug, Clone)]
pub struct Chamber<O> {
    /// The market's vault account
    address: Address,
    owner: Address,
    debt_asset: AssetId,
    params: Option<MarketInitParams>,
    oracle: O,
    state: MarketState,
    positions: BTreeMap<Address, UserPosition>,
    events: EventLog,
}

impl<O: Oracle> Chamber<O> {
    /// Create an uninitialized market at `address`
    pub fn new(address: Address, owner: Address, debt_asset: AssetId, oracle: O) -> Self {
        Self {
            address,
            owner,
            debt_asset,
            params: None,
            oracle,
            state: MarketState {
                fee_to: owner,
                ..MarketState::default()
            },
            positions: BTreeMap::new(),
            events: EventLog::new(),
        }
    }

    /// Configure the market from its Borsh-encoded `MarketInitParams`
    pub fn init(&mut self, init_data: &[u8], now: Timestamp) -> ChamberResult<()> {
        if self.params.is_some() {
            return Err(ChamberError::AlreadyInitialized);
        }
        let params = MarketInitParams::from_bytes(init_data)?;
        params.validate()?;

        self.state.accrue_info = AccrueInfo {
            last_accrued: now,
            fees_earned: 0,
            interest_per_second: params.interest_per_second,
        };
        self.params = Some(params);
        info!("market initialized");
        Ok(())
    }

    // ============ Queries ============

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn debt_asset(&self) -> AssetId {
        self.debt_asset
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn state(&self) -> &MarketState {
        &self.state
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventLog {
        &mut self.events
    }

    pub fn params(&self) -> ChamberResult<&MarketInitParams> {
        self.params.as_ref().ok_or(ChamberError::InvalidInput {
            param: "market",
            reason: "not initialized",
        })
    }

    pub fn collateral_asset(&self) -> ChamberResult<AssetId> {
        Ok(self.params()?.collateral)
    }

    pub fn position_of(&self, user: &Address) -> UserPosition {
        self.positions.get(user).copied().unwrap_or_default()
    }

    /// Position amounts derived at the cached rate
    pub fn position<C: TokenCustody>(&self, vault: &VaultLedger<C>, user: &Address) -> ChamberResult<PositionView> {
        let collateral = self.collateral_asset()?;
        let position = self.position_of(user);
        let collateral_amount = vault.to_amount(&collateral, position.collateral_share, false)?;
        let debt_amount = self.state.total_borrow.to_elastic(position.borrow_part, true)?;
        let collateral_value =
            chamber_common::math::collateral_value(collateral_amount, self.state.exchange_rate)?;
        Ok(PositionView {
            collateral_share: position.collateral_share,
            collateral_amount,
            borrow_part: position.borrow_part,
            debt_amount,
            collateral_value,
        })
    }

    /// Whether `user` satisfies the collateralization invariant at the cached rate
    pub fn is_solvent<C: TokenCustody>(&self, vault: &VaultLedger<C>, user: &Address) -> ChamberResult<bool> {
        let params = self.params()?;
        let position = self.position_of(user);
        if position.borrow_part == 0 {
            return Ok(true);
        }
        if position.collateral_share == 0 {
            return Ok(false);
        }
        let collateral_amount = vault.to_amount(&params.collateral, position.collateral_share, false)?;
        let debt_amount = self.state.total_borrow.to_elastic(position.borrow_part, true)?;
        Ok(interest::is_solvent(
            collateral_amount,
            debt_amount,
            self.state.exchange_rate,
            params.collateralization_bps,
        ))
    }

    /// Solvency and liquidation flags for `user` at the cached rate, plus the
    /// rate the oracle would serve at `now`
    pub fn health<C: TokenCustody>(
        &self,
        vault: &VaultLedger<C>,
        user: &Address,
        now: Timestamp,
    ) -> ChamberResult<PositionHealth> {
        let solvent = self.is_solvent(vault, user)?;
        let params = self.params()?;
        let (fresh, rate) = self.oracle.peek(&params.oracle_data, now);
        Ok(PositionHealth {
            solvent,
            liquidatable: !solvent,
            liquidation_bps: params.liquidation_bps,
            pending_rate: fresh.then_some(rate),
        })
    }

    // ============ Interest ============

    /// Compound outstanding debt up to `now`
    pub fn accrue(&mut self, now: Timestamp) -> ChamberResult<u128> {
        let extra = interest::accrue(&mut self.state.total_borrow, &mut self.state.accrue_info, now)?;
        if extra > 0 {
            debug!(extra, now, "interest accrued");
            self.events.emit(ChamberEvent::Accrue {
                interest: extra,
                timestamp: now,
            });
        }
        Ok(extra)
    }

    /// Read the oracle and cache the rate when the read succeeds.
    ///
    /// Returns whether the read succeeded and the rate now cached.
    pub fn update_exchange_rate(&mut self, now: Timestamp) -> ChamberResult<(bool, u128)> {
        let oracle_data = self.params()?.oracle_data.clone();
        let (updated, rate) = self.oracle.get(&oracle_data, now);
        if updated {
            self.state.exchange_rate = rate;
            self.events.emit(ChamberEvent::ExchangeRate { rate });
        }
        Ok((updated, self.state.exchange_rate))
    }

    // ============ Collateral ============

    /// Credit `share` collateral shares to `to`'s position.
    ///
    /// The shares come from `from`'s vault account, or with `skim` from shares
    /// the market already holds beyond its tracked collateral.
    pub fn add_collateral<C: TokenCustody>(
        &mut self,
        vault: &mut VaultLedger<C>,
        from: &Address,
        to: &Address,
        skim: bool,
        share: u128,
    ) -> ChamberResult<()> {
        let collateral = self.collateral_asset()?;
        let tracked = self.state.total_collateral_share;

        if skim {
            let held = vault.balance_of(&collateral, &self.address);
            let unclaimed = held.saturating_sub(tracked);
            if share > unclaimed {
                return Err(ChamberError::InsufficientBalance {
                    available: unclaimed,
                    requested: share,
                });
            }
        } else {
            vault.transfer(&self.address, &collateral, from, &self.address, share)?;
        }

        let mut position = self.position_of(to);
        position.collateral_share = safe_add(position.collateral_share, share)?;
        self.state.total_collateral_share = safe_add(tracked, share)?;
        self.positions.insert(*to, position);

        self.events.emit(ChamberEvent::AddCollateral {
            from: if skim { vault.address() } else { *from },
            to: *to,
            share,
        });
        Ok(())
    }

    /// Release `share` collateral shares from `from`'s position to `to`
    pub fn remove_collateral<C: TokenCustody>(
        &mut self,
        vault: &mut VaultLedger<C>,
        from: &Address,
        to: &Address,
        share: u128,
        now: Timestamp,
    ) -> ChamberResult<()> {
        let collateral = self.collateral_asset()?;
        self.accrue(now)?;

        let mut position = self.position_of(from);
        position.collateral_share = safe_sub(position.collateral_share, share)?;
        self.state.total_collateral_share = safe_sub(self.state.total_collateral_share, share)?;
        self.positions.insert(*from, position);

        vault.transfer(&self.address, &collateral, &self.address, to, share)?;

        self.events.emit(ChamberEvent::RemoveCollateral {
            from: *from,
            to: *to,
            share,
        });
        Ok(())
    }

    // ============ Debt ============

    /// Open `amount` of debt for `from` and send it to `to` as vault shares.
    ///
    /// The opening fee is added to the debt once. Returns `(part, share)`.
    pub fn borrow<C: TokenCustody>(
        &mut self,
        vault: &mut VaultLedger<C>,
        from: &Address,
        to: &Address,
        amount: u128,
        now: Timestamp,
    ) -> ChamberResult<(u128, u128)> {
        let fee_bps = self.params()?.opening_fee_bps;
        self.accrue(now)?;

        // 1. Debt is the amount plus the opening fee, parts round up
        let fee = opening_fee(amount, fee_bps)?;
        let owed = safe_add(amount, fee)?;
        let part = self.state.total_borrow.add(owed, true)?;
        self.state.accrue_info.fees_earned = safe_add(self.state.accrue_info.fees_earned, fee)?;

        let mut position = self.position_of(from);
        position.borrow_part = safe_add(position.borrow_part, part)?;
        self.positions.insert(*from, position);

        // 2. Send the borrowed amount out of the market's supply
        let share = vault.to_share(&self.debt_asset, amount, false)?;
        vault.transfer(&self.address, &self.debt_asset, &self.address, to, share)?;

        self.events.emit(ChamberEvent::Borrow {
            from: *from,
            to: *to,
            amount,
            fee,
            part,
        });
        Ok((part, share))
    }

    /// Repay `part` of `to`'s debt, paid by `from` (or by unclaimed vault
    /// shares with `skim`). Returns the amount repaid.
    #[allow(clippy::too_many_arguments)]
    pub fn repay<C: TokenCustody>(
        &mut self,
        vault: &mut VaultLedger<C>,
        from: &Address,
        to: &Address,
        skim: bool,
        part: u128,
        now: Timestamp,
    ) -> ChamberResult<u128> {
        self.accrue(now)?;

        // 1. Burn parts, the repayer covers the rounding
        let mut position = self.position_of(to);
        position.borrow_part = safe_sub(position.borrow_part, part)?;
        let amount = self.state.total_borrow.sub(part, true)?;
        self.positions.insert(*to, position);

        // 2. Collect the debt asset
        let share = vault.to_share(&self.debt_asset, amount, true)?;
        let payer = if skim { vault.address() } else { *from };
        vault.transfer(&self.address, &self.debt_asset, &payer, &self.address, share)?;

        self.events.emit(ChamberEvent::Repay {
            from: payer,
            to: *to,
            amount,
            part,
        });
        Ok(amount)
    }

    /// Vault shares needed to repay `part` right now
    pub fn repay_share<C: TokenCustody>(&self, vault: &VaultLedger<C>, part: u128) -> ChamberResult<u128> {
        let amount = self.state.total_borrow.to_elastic(part, true)?;
        vault.to_share(&self.debt_asset, amount, true)
    }

    /// Borrow parts an `amount` of debt asset repays
    pub fn repay_part(&self, amount: u128) -> ChamberResult<u128> {
        self.state.total_borrow.to_base(amount, false)
    }

    // ============ Administration ============

    fn only_owner(&self, caller: &Address) -> ChamberResult<()> {
        if *caller != self.owner {
            return Err(ChamberError::OwnerOnly);
        }
        Ok(())
    }

    /// Set the fee sink
    pub fn set_fee_to(&mut self, caller: &Address, new_fee_to: Address) -> ChamberResult<()> {
        self.only_owner(caller)?;
        self.state.fee_to = new_fee_to;
        self.events.emit(ChamberEvent::FeeTo { new_fee_to });
        Ok(())
    }

    /// Settle accrued fees to the fee sink as debt-asset vault shares.
    /// Returns the fee amount settled.
    pub fn withdraw_fees<C: TokenCustody>(&mut self, vault: &mut VaultLedger<C>, now: Timestamp) -> ChamberResult<u128> {
        self.accrue(now)?;
        let fee_to = self.state.fee_to;
        if fee_to == ZERO_ADDRESS {
            return Err(ChamberError::InvalidInput {
                param: "fee_to",
                reason: "fee sink not set",
            });
        }

        let amount = self.state.accrue_info.fees_earned;
        let share = vault.to_share(&self.debt_asset, amount, false)?;
        vault.transfer(&self.address, &self.debt_asset, &self.address, &fee_to, share)?;
        self.state.accrue_info.fees_earned = 0;

        info!(amount, share, "fees withdrawn");
        self.events.emit(ChamberEvent::WithdrawFees { fee_to, amount });
        Ok(amount)
    }

    /// Change the per-second interest rate after accruing at the old one
    pub fn change_interest_rate(&mut self, caller: &Address, new_rate: u64, now: Timestamp) -> ChamberResult<()> {
        self.only_owner(caller)?;
        self.accrue(now)?;

        let old_rate = self.state.accrue_info.interest_per_second;
        self.state.accrue_info.interest_per_second = new_rate;
        if let Some(params) = self.params.as_mut() {
            params.interest_per_second = new_rate;
        }

        info!(old_rate, new_rate, "interest rate changed");
        self.events.emit(ChamberEvent::InterestChange { old_rate, new_rate });
        Ok(())
    }

    /// Withdraw up to `amount` of unborrowed debt asset to the owner.
    /// Returns the amount withdrawn.
    pub fn reduce_supply<C: TokenCustody>(
        &mut self,
        vault: &mut VaultLedger<C>,
        caller: &Address,
        amount: u128,
    ) -> ChamberResult<u128> {
        self.only_owner(caller)?;
        let held = vault.balance_of(&self.debt_asset, &self.address);
        let available = vault.to_amount(&self.debt_asset, held, false)?;
        let amount = amount.min(available);
        if amount == 0 {
            return Ok(0);
        }
        let (withdrawn, _) = vault.withdraw(&self.address, &self.debt_asset, &self.address, &self.owner, amount, 0)?;
        Ok(withdrawn)
    }
}
