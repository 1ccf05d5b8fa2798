//! Chamber Vault - Share-Accounted Token Custody
//!
//! Pools every asset deposited by users and markets into one custody account
//! and tracks ownership as shares of each asset's total.
//!
//! ## Core Operations
//!
//! - **deposit**: pull tokens into custody and credit shares
//! - **withdraw**: debit shares and push tokens out of custody
//! - **transfer**: move shares between accounts without touching tokens
//! - **set_master_approval**: grant or revoke a master contract's right to
//!   move a user's shares, authorized by an off-band signature
//! - **deploy_market**: register a market instance against its master
//!
//! ## Rounding
//!
//! Conversions always favor the vault: a deposit by amount rounds shares
//! down, a withdrawal by amount rounds shares up, a deposit by share rounds
//! the amount up and a withdrawal by share rounds the amount down.

pub mod approval;
pub mod custody;

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use tracing::debug;

use chamber_common::{
    constants::vault::NATIVE_ASSET,
    errors::{ChamberError, ChamberResult},
    events::{ChamberEvent, EventLog},
    math::{safe_add, safe_sub},
    types::{Address, AssetId, Rebase, ZERO_ADDRESS},
};

pub use approval::{ApprovalDomain, ApprovalSignature};
pub use custody::{TokenBank, TokenCustody};

// ============ Vault Ledger ============

/// Pooled custody ledger over a token custody backend
#[derive(Debug, Clone)]
pub struct VaultLedger<C> {
    /// The vault's own custody account
    address: Address,
    /// Token standing in for the native asset
    wrapped_native: AssetId,
    /// Per-asset `(amount, shares)`
    totals: BTreeMap<AssetId, Rebase>,
    /// `(asset, owner) -> shares`
    balances: BTreeMap<(AssetId, Address), u128>,
    /// `market -> master` for deployed markets
    master_of: BTreeMap<Address, Address>,
    /// `(user, master) -> approved`
    approvals: BTreeMap<(Address, Address), bool>,
    /// Next approval nonce per user
    nonces: BTreeMap<Address, u128>,
    domain: ApprovalDomain,
    custody: C,
    events: EventLog,
}

impl<C: TokenCustody> VaultLedger<C> {
    /// Create an empty vault holding its tokens at `address`
    pub fn new(address: Address, wrapped_native: AssetId, custody: C) -> Self {
        Self {
            address,
            wrapped_native,
            totals: BTreeMap::new(),
            balances: BTreeMap::new(),
            master_of: BTreeMap::new(),
            approvals: BTreeMap::new(),
            nonces: BTreeMap::new(),
            domain: ApprovalDomain::new(address),
            custody,
            events: EventLog::new(),
        }
    }

    // ============ Queries ============

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn domain(&self) -> &ApprovalDomain {
        &self.domain
    }

    pub fn custody(&self) -> &C {
        &self.custody
    }

    pub fn custody_mut(&mut self) -> &mut C {
        &mut self.custody
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventLog {
        &mut self.events
    }

    /// Total `(amount, shares)` of an asset
    pub fn totals(&self, asset: &AssetId) -> Rebase {
        self.totals
            .get(&self.resolve(asset))
            .copied()
            .unwrap_or_default()
    }

    /// Shares of `asset` owned by `owner`
    pub fn balance_of(&self, asset: &AssetId, owner: &Address) -> u128 {
        self.balances
            .get(&(self.resolve(asset), *owner))
            .copied()
            .unwrap_or(0)
    }

    /// Convert an amount of `asset` to shares
    pub fn to_share(&self, asset: &AssetId, amount: u128, round_up: bool) -> ChamberResult<u128> {
        self.totals(asset).to_base(amount, round_up)
    }

    /// Convert shares of `asset` to an amount
    pub fn to_amount(&self, asset: &AssetId, share: u128, round_up: bool) -> ChamberResult<u128> {
        self.totals(asset).to_elastic(share, round_up)
    }

    /// Next nonce an approval signature from `user` must carry
    pub fn nonce(&self, user: &Address) -> u128 {
        self.nonces.get(user).copied().unwrap_or(0)
    }

    /// Whether `user` approved `master`
    pub fn is_approved(&self, user: &Address, master: &Address) -> bool {
        self.approvals.get(&(*user, *master)).copied().unwrap_or(false)
    }

    /// Master a deployed market was cloned from
    pub fn master_of(&self, market: &Address) -> Option<Address> {
        self.master_of.get(market).copied()
    }

    // ============ Authorization ============

    /// `caller` may move `from`'s funds when it is `from`, or when it is a
    /// market whose master `from` approved.
    fn authorize(&self, from: &Address, caller: &Address) -> ChamberResult<()> {
        if from == caller {
            return Ok(());
        }
        match self.master_of(caller) {
            Some(master) if self.is_approved(from, &master) => Ok(()),
            _ => Err(ChamberError::Unauthorized {
                owner: *from,
                caller: *caller,
            }),
        }
    }

    fn resolve(&self, asset: &AssetId) -> AssetId {
        if *asset == NATIVE_ASSET {
            self.wrapped_native
        } else {
            *asset
        }
    }

    fn credit(&mut self, token: AssetId, to: Address, share: u128) -> ChamberResult<()> {
        let balance = self.balances.entry((token, to)).or_insert(0);
        *balance = safe_add(*balance, share)?;
        Ok(())
    }

    fn debit(&mut self, token: AssetId, from: Address, share: u128) -> ChamberResult<()> {
        let balance = self.balances.get(&(token, from)).copied().unwrap_or(0);
        let remaining = safe_sub(balance, share)?;
        self.balances.insert((token, from), remaining);
        Ok(())
    }

    // ============ Movements ============

    /// Deposit `asset` from `from` into `to`'s account.
    ///
    /// Exactly one of `amount` and `share` drives the conversion; when
    /// `share` is non-zero it wins. Depositing from the vault's own address
    /// skims tokens it holds beyond its tracked totals. `native_value` is
    /// the native currency attached to the call and bounds a native deposit.
    ///
    /// Returns the `(amount, share)` actually deposited.
    #[allow(clippy::too_many_arguments)]
    pub fn deposit(
        &mut self,
        caller: &Address,
        asset: &AssetId,
        from: &Address,
        to: &Address,
        amount: u128,
        share: u128,
        native_value: u128,
    ) -> ChamberResult<(u128, u128)> {
        // 1. Validate inputs
        if *to == ZERO_ADDRESS {
            return Err(ChamberError::InvalidInput {
                param: "to",
                reason: "cannot be zero address",
            });
        }
        if amount == 0 && share == 0 {
            return Err(ChamberError::InvalidInput {
                param: "amount",
                reason: "amount and share both zero",
            });
        }

        // 2. Skimming takes unclaimed tokens and needs no approval
        let skim = *from == self.address;
        let native = *asset == NATIVE_ASSET;
        if !skim {
            self.authorize(from, caller)?;
        }

        // 3. Convert against the current ratio
        let token = self.resolve(asset);
        let mut total = self.totals(&token);
        let (amount, share) = if share == 0 {
            (amount, total.to_base(amount, false)?)
        } else {
            (total.to_elastic(share, true)?, share)
        };
        if share == 0 {
            // Too small to be worth a share
            return Ok((0, 0));
        }

        // 4. Bring the tokens into custody
        if skim {
            let held = self.custody.balance_of(&token, &self.address);
            let unclaimed = held.saturating_sub(total.elastic);
            if amount > unclaimed {
                return Err(ChamberError::InsufficientBalance {
                    available: unclaimed,
                    requested: amount,
                });
            }
        } else if native {
            if amount > native_value {
                return Err(ChamberError::InsufficientBalance {
                    available: native_value,
                    requested: amount,
                });
            }
            if !self.custody.wrap_native(&token, from, &self.address, amount) {
                return Err(self.transfer_failed(token, *from, self.address, amount));
            }
        } else if !self.custody.pull(&token, from, &self.address, amount) {
            return Err(self.transfer_failed(token, *from, self.address, amount));
        }

        // 5. Credit shares
        total.add_both(amount, share)?;
        self.credit(token, *to, share)?;
        self.totals.insert(token, total);

        debug!(amount, share, "vault deposit");
        self.events.emit(ChamberEvent::Deposit {
            asset: token,
            from: *from,
            to: *to,
            amount,
            share,
        });

        Ok((amount, share))
    }

    /// Withdraw `asset` from `from`'s account to `to`.
    ///
    /// Withdrawing the native asset unwraps it on the way out.
    /// Returns the `(amount, share)` actually withdrawn.
    pub fn withdraw(
        &mut self,
        caller: &Address,
        asset: &AssetId,
        from: &Address,
        to: &Address,
        amount: u128,
        share: u128,
    ) -> ChamberResult<(u128, u128)> {
        // 1. Validate inputs
        if *to == ZERO_ADDRESS {
            return Err(ChamberError::InvalidInput {
                param: "to",
                reason: "cannot be zero address",
            });
        }
        if amount == 0 && share == 0 {
            return Err(ChamberError::InvalidInput {
                param: "amount",
                reason: "amount and share both zero",
            });
        }
        self.authorize(from, caller)?;

        // 2. Convert against the current ratio
        let token = self.resolve(asset);
        let mut total = self.totals(&token);
        let (amount, share) = if share == 0 {
            (amount, total.to_base(amount, true)?)
        } else {
            (total.to_elastic(share, false)?, share)
        };

        // 3. Debit shares
        self.debit(token, *from, share)?;
        total.sub_both(amount, share)?;
        self.totals.insert(token, total);

        // 4. Release the tokens
        let sent = if *asset == NATIVE_ASSET {
            self.custody.unwrap_native(&token, &self.address, to, amount)
        } else {
            self.custody.push(&token, &self.address, to, amount)
        };
        if !sent {
            return Err(self.transfer_failed(token, self.address, *to, amount));
        }

        debug!(amount, share, "vault withdraw");
        self.events.emit(ChamberEvent::Withdraw {
            asset: token,
            from: *from,
            to: *to,
            amount,
            share,
        });

        Ok((amount, share))
    }

    /// Move `share` of `asset` from `from` to `to`.
    ///
    /// Shares credited to the vault's own address are unclaimed and any
    /// caller may move them.
    pub fn transfer(
        &mut self,
        caller: &Address,
        asset: &AssetId,
        from: &Address,
        to: &Address,
        share: u128,
    ) -> ChamberResult<()> {
        if *to == ZERO_ADDRESS {
            return Err(ChamberError::InvalidInput {
                param: "to",
                reason: "cannot be zero address",
            });
        }
        if *from != self.address {
            self.authorize(from, caller)?;
        }

        let token = self.resolve(asset);
        self.debit(token, *from, share)?;
        self.credit(token, *to, share)?;

        self.events.emit(ChamberEvent::Transfer {
            asset: token,
            from: *from,
            to: *to,
            share,
        });
        Ok(())
    }

    // ============ Approvals ============

    /// Grant or revoke `master`'s access to `user`'s funds with a signature
    /// over the user's current nonce. The nonce is consumed on success.
    pub fn set_master_approval(
        &mut self,
        user: &Address,
        master: &Address,
        approved: bool,
        signature: &ApprovalSignature,
    ) -> ChamberResult<()> {
        if *user == ZERO_ADDRESS {
            return Err(ChamberError::InvalidInput {
                param: "user",
                reason: "cannot be zero address",
            });
        }

        let nonce = self.nonce(user);
        approval::verify_approval(&self.domain, user, master, approved, nonce, signature)?;
        self.nonces.insert(*user, safe_add(nonce, 1)?);

        self.set_delegate_approval(user, master, approved);
        Ok(())
    }

    pub(crate) fn set_delegate_approval(&mut self, user: &Address, master: &Address, approved: bool) {
        self.approvals.insert((*user, *master), approved);
        debug!(approved, "delegate approval updated");
        self.events.emit(ChamberEvent::DelegateApproval {
            user: *user,
            delegate: *master,
            approved,
        });
    }

    // ============ Deployment ============

    /// Register a market cloned from `master` and return its address.
    ///
    /// The address is the first 20 bytes of `sha256(master || init_data || salt)`.
    pub fn deploy_market(&mut self, master: &Address, init_data: &[u8], salt: &[u8; 32]) -> ChamberResult<Address> {
        let market = market_address(master, init_data, salt);
        if self.master_of.contains_key(&market) {
            return Err(ChamberError::AlreadyInitialized);
        }
        self.master_of.insert(market, *master);

        self.events.emit(ChamberEvent::MarketDeployed {
            master: *master,
            market,
        });
        Ok(market)
    }

    fn transfer_failed(&self, asset: AssetId, from: Address, to: Address, amount: u128) -> ChamberError {
        ChamberError::TransferFailed {
            asset,
            from,
            to,
            amount,
        }
    }
}

/// Deterministic market address
pub fn market_address(master: &Address, init_data: &[u8], salt: &[u8; 32]) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(master);
    hasher.update(init_data);
    hasher.update(salt);
    let hash = hasher.finalize();

    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[..20]);
    address
}

// ============ Tests ============
