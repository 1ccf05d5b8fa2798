//! Cook - Atomic Batch Interpreter
//!
//! A batch is three parallel sequences: operation codes, the native value
//! attached to each step, and each step's parameter blob. Steps run in order
//! against working copies of the market, the vault and the external call
//! target. The copies replace the originals only if every step succeeds and
//! the caller's position is solvent afterwards, with debt accrued to the
//! batch time; any error discards them.
//!
//! ## Value Chaining
//!
//! Each step leaves an optional `StepResult` behind. A later numeric
//! parameter written as `Num::PreviousFirst` or `Num::PreviousSecond` takes
//! that value; steps without a result clear it.
//!
//! ## Lifecycle
//!
//! ```text
//! Pending -> Executing(0) -> ... -> Executing(n-1) -> SolvencyCheck
//!         -> Committed | Reverted(step, error)
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use chamber_common::{
    constants::cook::MAX_BATCH_SIZE,
    errors::{ChamberError, ChamberResult},
    events::ChamberEvent,
    types::{Address, Timestamp},
};
use chamber_oracle::Oracle;
use chamber_vault::{TokenCustody, VaultLedger};

use crate::action::{Action, CallParams, Num, StepResult, ACTION_CALL};
use crate::Chamber;

// ============ External Calls ============

/// Receiver of opaque pass-through calls
pub trait CallTarget {
    /// Run `data` against `callee` with `native_value` attached.
    /// Returns the raw return data, or `None` when the call reverts.
    fn call(&mut self, callee: &Address, native_value: u128, data: &[u8]) -> Option<Vec<u8>>;
}

/// Call target that rejects every call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoCallTarget;

impl CallTarget for NoCallTarget {
    fn call(&mut self, _callee: &Address, _native_value: u128, _data: &[u8]) -> Option<Vec<u8>> {
        None
    }
}

// ============ Batch ============

/// Batch envelope
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Batch {
    pub actions: Vec<u8>,
    pub values: Vec<u128>,
    pub datas: Vec<Vec<u8>>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step with no native value
    pub fn with(self, action: Action) -> Self {
        self.with_value(action, 0)
    }

    /// Append a step carrying `value` of native currency
    pub fn with_value(mut self, action: Action, value: u128) -> Self {
        self.actions.push(action.code());
        self.values.push(value);
        self.datas.push(action.encode());
        self
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Check the three sequences line up
    pub fn validate(&self) -> ChamberResult<()> {
        if self.values.len() != self.actions.len() || self.datas.len() != self.actions.len() {
            return Err(ChamberError::InvalidBatch {
                reason: "sequence lengths differ",
            });
        }
        if self.actions.len() > MAX_BATCH_SIZE {
            return Err(ChamberError::InvalidBatch {
                reason: "too many steps",
            });
        }
        Ok(())
    }

    /// Encode the envelope as CBOR
    pub fn to_cbor(&self) -> ChamberResult<Vec<u8>> {
        let mut buffer = Vec::new();
        ciborium::ser::into_writer(self, &mut buffer).map_err(|_| ChamberError::InvalidBatch {
            reason: "cannot encode envelope",
        })?;
        Ok(buffer)
    }

    /// Decode a CBOR envelope
    pub fn from_cbor(bytes: &[u8]) -> ChamberResult<Self> {
        ciborium::de::from_reader(bytes).map_err(|_| ChamberError::InvalidBatch {
            reason: "malformed envelope",
        })
    }
}

/// What a committed batch produced
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CookOutcome {
    /// Result left by the last step
    pub result: Option<StepResult>,
    /// Events logged since the last committed batch, vault events first.
    /// Includes events of direct ledger calls made in between.
    pub events: Vec<ChamberEvent>,
}

// ============ Interpreter ============

/// Working state of a batch in flight
struct CookContext<C, O, X> {
    market: Chamber<O>,
    vault: VaultLedger<C>,
    target: X,
    caller: Address,
    now: Timestamp,
    previous: Option<StepResult>,
    needs_solvency_check: bool,
}

/// Run `batch` for `caller` at time `now`, all or nothing
pub fn cook<C, O, X>(
    market: &mut Chamber<O>,
    vault: &mut VaultLedger<C>,
    target: &mut X,
    caller: &Address,
    batch: &Batch,
    now: Timestamp,
) -> ChamberResult<CookOutcome>
where
    C: TokenCustody + Clone,
    O: Oracle + Clone,
    X: CallTarget + Clone,
{
    batch.validate()?;
    if batch.is_empty() {
        return Ok(CookOutcome::default());
    }

    let mut ctx = CookContext {
        market: market.clone(),
        vault: vault.clone(),
        target: target.clone(),
        caller: *caller,
        now,
        previous: None,
        needs_solvency_check: false,
    };

    match ctx.run(batch) {
        Ok(()) => {
            // Committed state carries no event history
            let mut events = ctx.vault.events_mut().drain();
            events.extend(ctx.market.events_mut().drain());

            *market = ctx.market;
            *vault = ctx.vault;
            *target = ctx.target;

            info!(steps = batch.len(), events = events.len(), "batch committed");
            Ok(CookOutcome {
                result: ctx.previous,
                events,
            })
        }
        Err((step, err)) => {
            warn!(
                step,
                code = err.code(),
                recoverable = err.is_recoverable(),
                "batch reverted"
            );
            Err(err)
        }
    }
}

impl<C, O, X> CookContext<C, O, X>
where
    C: TokenCustody,
    O: Oracle,
    X: CallTarget,
{
    fn run(&mut self, batch: &Batch) -> Result<(), (usize, ChamberError)> {
        let steps = batch
            .actions
            .iter()
            .zip(&batch.values)
            .zip(&batch.datas)
            .enumerate();

        for (index, ((code, value), data)) in steps {
            debug!(step = index, code = *code, "cook step");
            let action = Action::decode(*code, data).map_err(|e| (index, e))?;
            self.previous = self.execute(&action, *value).map_err(|e| (index, e))?;
        }

        if self.needs_solvency_check {
            self.market.accrue(self.now).map_err(|e| (batch.len(), e))?;
            let solvent = self
                .market
                .is_solvent(&self.vault, &self.caller)
                .map_err(|e| (batch.len(), e))?;
            if !solvent {
                return Err((batch.len(), ChamberError::Insolvent { user: self.caller }));
            }
        }
        Ok(())
    }

    fn execute(&mut self, action: &Action, value: u128) -> ChamberResult<Option<StepResult>> {
        let previous = self.previous;
        let previous = previous.as_ref();
        let caller = self.caller;
        let now = self.now;
        let code = action.code();
        let market_address = self.market.address();

        match action {
            Action::Repay(p) => {
                let part = p.part.resolve(previous, code)?;
                let amount = self
                    .market
                    .repay(&mut self.vault, &caller, &p.to, p.skim, part, now)?;
                self.touch(&p.to);
                Ok(Some(StepResult::single(amount)))
            }
            Action::RemoveCollateral(p) => {
                let share = p.share.resolve(previous, code)?;
                self.market
                    .remove_collateral(&mut self.vault, &caller, &p.to, share, now)?;
                self.touch(&caller);
                Ok(None)
            }
            Action::Borrow(p) => {
                let amount = p.amount.resolve(previous, code)?;
                let (part, share) = self.market.borrow(&mut self.vault, &caller, &p.to, amount, now)?;
                self.touch(&caller);
                Ok(Some(StepResult::pair(part, share)))
            }
            Action::GetRepayShare(p) => {
                let part = p.part.resolve(previous, code)?;
                self.market.accrue(now)?;
                let share = self.market.repay_share(&self.vault, part)?;
                Ok(Some(StepResult::single(share)))
            }
            Action::GetRepayPart(p) => {
                let amount = p.amount.resolve(previous, code)?;
                self.market.accrue(now)?;
                let part = self.market.repay_part(amount)?;
                Ok(Some(StepResult::single(part)))
            }
            Action::AddCollateral(p) => {
                let share = p.share.resolve(previous, code)?;
                self.market
                    .add_collateral(&mut self.vault, &caller, &p.to, p.skim, share)?;
                self.touch(&p.to);
                Ok(None)
            }
            Action::UpdateExchangeRate(p) => {
                let (updated, rate) = self.market.update_exchange_rate(now)?;
                if p.must_update && !updated {
                    return Err(ChamberError::StaleOrInvalidRate { rate });
                }
                let below = p.min_rate != 0 && rate < p.min_rate;
                let above = p.max_rate != 0 && rate > p.max_rate;
                if below || above {
                    return Err(ChamberError::StaleOrInvalidRate { rate });
                }
                Ok(Some(StepResult::single(rate)))
            }
            Action::VaultDeposit(p) => {
                let amount = p.amount.resolve(previous, code)?;
                let share = p.share.resolve(previous, code)?;
                let (amount, share) = self
                    .vault
                    .deposit(&market_address, &p.asset, &caller, &p.to, amount, share, value)?;
                Ok(Some(StepResult::pair(amount, share)))
            }
            Action::VaultWithdraw(p) => {
                let amount = p.amount.resolve(previous, code)?;
                let share = p.share.resolve(previous, code)?;
                let (amount, share) = self
                    .vault
                    .withdraw(&market_address, &p.asset, &caller, &p.to, amount, share)?;
                Ok(Some(StepResult::pair(amount, share)))
            }
            Action::VaultTransfer(p) => {
                let share = p.share.resolve(previous, code)?;
                self.vault
                    .transfer(&market_address, &p.asset, &caller, &p.to, share)?;
                Ok(None)
            }
            Action::SetApproval(p) => {
                self.vault
                    .set_master_approval(&p.user, &p.master, p.approved, &p.signature)?;
                Ok(None)
            }
            Action::Call(p) => self.call(p, value, previous),
        }
    }

    /// Flag the end-of-batch solvency check when the caller's position moves
    fn touch(&mut self, user: &Address) {
        if *user == self.caller {
            self.needs_solvency_check = true;
        }
    }

    fn call(
        &mut self,
        params: &CallParams,
        value: u128,
        previous: Option<&StepResult>,
    ) -> ChamberResult<Option<StepResult>> {
        let callee = params.callee;
        if callee == self.vault.address() || callee == self.market.address() {
            return Err(ChamberError::CallFailed { callee });
        }

        let mut data = params.data.clone();
        if params.use_value1 {
            let first = Num::PreviousFirst.resolve(previous, ACTION_CALL)?;
            data.extend_from_slice(&encode_word(first));
        }
        if params.use_value2 {
            let second = Num::PreviousSecond.resolve(previous, ACTION_CALL)?;
            data.extend_from_slice(&encode_word(second));
        }

        let returned = self
            .target
            .call(&callee, value, &data)
            .ok_or(ChamberError::CallFailed { callee })?;

        match params.return_values {
            0 => Ok(None),
            1 => Ok(Some(StepResult::single(decode_word(&returned, 0)?))),
            _ => Ok(Some(StepResult::pair(
                decode_word(&returned, 0)?,
                decode_word(&returned, 1)?,
            ))),
        }
    }
}

// ============ Word Encoding ============

/// Big-endian 32-byte word
fn encode_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Read the `index`-th 32-byte word of `data` as a `u128`
fn decode_word(data: &[u8], index: usize) -> ChamberResult<u128> {
    let start = index * 32;
    let word = data.get(start..start + 32).ok_or(ChamberError::DecodeError {
        code: ACTION_CALL,
        reason: "short return data",
    })?;
    if word[..16].iter().any(|b| *b != 0) {
        return Err(ChamberError::ArithmeticOverflow);
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}
