//! Token Custody
//!
//! The vault never moves underlying tokens itself. It asks a `TokenCustody`
//! implementation to pull tokens into, or push tokens out of, its custody
//! account. `TokenBank` is an in-memory implementation used by hosts that keep
//! token balances alongside the ledger, and by the test suites.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use chamber_common::types::{Address, AssetId};

/// Token transfer primitive consumed by the vault ledger.
///
/// Every method returns `false` when the movement is refused; the ledger
/// turns that into `TransferFailed` and the enclosing batch aborts.
pub trait TokenCustody {
    /// Move `amount` of `asset` from `from` into the custody account `vault`
    fn pull(&mut self, asset: &AssetId, from: &Address, vault: &Address, amount: u128) -> bool;

    /// Move `amount` of `asset` from the custody account `vault` to `to`
    fn push(&mut self, asset: &AssetId, vault: &Address, to: &Address, amount: u128) -> bool;

    /// Take `amount` of native currency sent by `from` and hold it in the
    /// custody account as the `wrapped` token
    fn wrap_native(&mut self, wrapped: &AssetId, from: &Address, vault: &Address, amount: u128) -> bool;

    /// Unwrap `amount` of the `wrapped` token held by `vault` and send the
    /// native currency to `to`
    fn unwrap_native(&mut self, wrapped: &AssetId, vault: &Address, to: &Address, amount: u128) -> bool;

    /// Token balance of `holder`
    fn balance_of(&self, asset: &AssetId, holder: &Address) -> u128;
}

// ============ In-Memory Bank ============

/// Key used for native currency balances inside `TokenBank`
pub const NATIVE_CURRENCY: AssetId = [0u8; 20];

/// In-memory token balances keyed by `(asset, holder)`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBank {
    balances: BTreeMap<(AssetId, Address), u128>,
    /// Holders whose outgoing transfers are refused
    frozen: BTreeSet<Address>,
}

impl TokenBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` of `asset` to `to` out of thin air
    pub fn mint(&mut self, asset: AssetId, to: Address, amount: u128) {
        let balance = self.balances.entry((asset, to)).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Refuse every outgoing transfer from `holder`
    pub fn freeze(&mut self, holder: Address) {
        self.frozen.insert(holder);
    }

    pub fn unfreeze(&mut self, holder: &Address) {
        self.frozen.remove(holder);
    }

    fn move_balance(&mut self, asset: &AssetId, from: &Address, to: &Address, amount: u128) -> bool {
        self.move_between(asset, from, asset, to, amount)
    }

    /// Debit `amount` of `debit_asset` from `from` and credit it to `to` as
    /// `credit_asset`
    fn move_between(
        &mut self,
        debit_asset: &AssetId,
        from: &Address,
        credit_asset: &AssetId,
        to: &Address,
        amount: u128,
    ) -> bool {
        if self.frozen.contains(from) {
            return false;
        }
        let available = self.balance_of(debit_asset, from);
        if available < amount {
            return false;
        }
        if debit_asset == credit_asset && from == to {
            return true;
        }
        let Some(credited) = self.balance_of(credit_asset, to).checked_add(amount) else {
            return false;
        };
        self.balances.insert((*debit_asset, *from), available - amount);
        self.balances.insert((*credit_asset, *to), credited);
        true
    }
}

impl TokenCustody for TokenBank {
    fn pull(&mut self, asset: &AssetId, from: &Address, vault: &Address, amount: u128) -> bool {
        self.move_balance(asset, from, vault, amount)
    }

    fn push(&mut self, asset: &AssetId, vault: &Address, to: &Address, amount: u128) -> bool {
        self.move_balance(asset, vault, to, amount)
    }

    fn wrap_native(&mut self, wrapped: &AssetId, from: &Address, vault: &Address, amount: u128) -> bool {
        self.move_between(&NATIVE_CURRENCY, from, wrapped, vault, amount)
    }

    fn unwrap_native(&mut self, wrapped: &AssetId, vault: &Address, to: &Address, amount: u128) -> bool {
        self.move_between(wrapped, vault, &NATIVE_CURRENCY, to, amount)
    }

    fn balance_of(&self, asset: &AssetId, holder: &Address) -> u128 {
        self.balances.get(&(*asset, *holder)).copied().unwrap_or(0)
    }
}
