//! Integration Tests for the Chamber Market
//!
//! End-to-end batches through `cook`: a user approves the market's master by
//! signature, deposits collateral, borrows, repays, and the market settles
//! fees, all against a real vault ledger and an operator-pushed feed.

use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

use chamber_common::{
    constants::precision::ONE,
    errors::{ChamberError, ChamberResult},
    events::{ChamberEvent, EventType},
    math::interest_per_second_from_apr_bps,
    types::{Address, AssetId, Timestamp},
};
use chamber_oracle::FeedOracle;
use chamber_vault::{
    approval::{address_from_public_key, approval_digest},
    ApprovalSignature, TokenBank, TokenCustody, VaultLedger,
};

use crate::action::*;
use crate::cook::{cook, Batch, CallTarget, CookOutcome};
use crate::{Chamber, MarketInitParams};

// ============ Fixtures ============

const VAULT: Address = [0xB0; 20];
const WETH: AssetId = [0xEE; 20];
const COLLATERAL: AssetId = [0xC0; 20];
const DEBT: AssetId = [0xD0; 20];
const MASTER: Address = [0xCA; 20];
const OWNER: Address = [0x0A; 20];
const OPERATOR: Address = [0x0B; 20];
const STRANGER: Address = [0x5A; 20];
const HOOK: Address = [0x4B; 20];
const START: Timestamp = 1_700_000_000;

/// Collateral priced at 1000 debt units, 8-decimal feed
const PRICE_1000: u128 = 1_000_00000000;
const SUPPLY: u128 = 10_000 * ONE;

/// External call target that records calls and answers with canned data
#[derive(Debug, Clone, Default)]
struct Recorder {
    calls: Vec<(Address, u128, Vec<u8>)>,
    response: Vec<u8>,
    revert: bool,
}

impl CallTarget for Recorder {
    fn call(&mut self, callee: &Address, native_value: u128, data: &[u8]) -> Option<Vec<u8>> {
        self.calls.push((*callee, native_value, data.to_vec()));
        if self.revert {
            None
        } else {
            Some(self.response.clone())
        }
    }
}

struct Env {
    vault: VaultLedger<TokenBank>,
    market: Chamber<FeedOracle>,
    target: Recorder,
    user: Address,
    secret: SecretKey,
}

fn setup(opening_fee_bps: u64, apr_bps: u64) -> Env {
    let secret = SecretKey::from_slice(&[0x42; 32]).unwrap();
    let user = address_from_public_key(&PublicKey::from_secret_key(&Secp256k1::new(), &secret));

    let mut bank = TokenBank::new();
    bank.mint(COLLATERAL, user, 100 * ONE);
    bank.mint(DEBT, OWNER, SUPPLY);
    let mut vault = VaultLedger::new(VAULT, WETH, bank);

    let params = MarketInitParams {
        collateral: COLLATERAL,
        oracle: [0x0C; 20],
        oracle_data: vec![],
        interest_per_second: interest_per_second_from_apr_bps(apr_bps),
        liquidation_bps: 10_400,
        collateralization_bps: 9_000,
        opening_fee_bps,
    };
    let init = params.to_bytes();
    let address = vault.deploy_market(&MASTER, &init, &[0u8; 32]).unwrap();

    let oracle = FeedOracle::new(OWNER, OPERATOR, PRICE_1000, 8, 3_600, START);
    let mut market = Chamber::new(address, OWNER, DEBT, oracle);
    market.init(&init, START).unwrap();

    // The owner supplies the debt asset to the market
    vault
        .deposit(&OWNER, &DEBT, &OWNER, &address, SUPPLY, 0, 0)
        .unwrap();

    Env {
        vault,
        market,
        target: Recorder::default(),
        user,
        secret,
    }
}

impl Env {
    fn cook(&mut self, batch: &Batch, now: Timestamp) -> ChamberResult<CookOutcome> {
        let user = self.user;
        cook(&mut self.market, &mut self.vault, &mut self.target, &user, batch, now)
    }

    fn cook_as(&mut self, caller: Address, batch: &Batch, now: Timestamp) -> ChamberResult<CookOutcome> {
        cook(&mut self.market, &mut self.vault, &mut self.target, &caller, batch, now)
    }

    fn approval(&self, approved: bool) -> Action {
        let nonce = self.vault.nonce(&self.user);
        let digest = approval_digest(self.vault.domain(), &self.user, &MASTER, approved, nonce);
        let message = Message::from_slice(&digest).unwrap();
        let (recovery_id, compact) = Secp256k1::new()
            .sign_ecdsa_recoverable(&message, &self.secret)
            .serialize_compact();

        Action::SetApproval(SetApprovalParams {
            user: self.user,
            master: MASTER,
            approved,
            signature: ApprovalSignature::from_compact(&compact, recovery_id.to_i32()),
        })
    }

    fn debt_of(&self, user: &Address) -> u128 {
        self.market.position(&self.vault, user).unwrap().debt_amount
    }

    fn debt_tokens(&self) -> u128 {
        self.vault.custody().balance_of(&DEBT, &self.user)
    }
}

fn update_rate() -> Action {
    Action::UpdateExchangeRate(UpdateExchangeRateParams {
        must_update: true,
        min_rate: 0,
        max_rate: 0,
    })
}

fn deposit_collateral(market: Address, amount: u128) -> Action {
    Action::VaultDeposit(VaultDepositParams {
        asset: COLLATERAL,
        to: market,
        amount: Num::Value(amount),
        share: Num::Value(0),
    })
}

fn skim_collateral(to: Address) -> Action {
    Action::AddCollateral(AddCollateralParams {
        share: Num::PreviousSecond,
        to,
        skim: true,
    })
}

fn borrow(amount: u128, to: Address) -> Action {
    Action::Borrow(BorrowParams {
        amount: Num::Value(amount),
        to,
    })
}

fn withdraw_borrowed(to: Address) -> Action {
    Action::VaultWithdraw(VaultWithdrawParams {
        asset: DEBT,
        to,
        amount: Num::Value(0),
        share: Num::PreviousSecond,
    })
}

/// Approve, price, deposit and lock collateral, borrow and withdraw
fn open_position(env: &Env, collateral: u128, amount: u128) -> Batch {
    let market = env.market.address();
    Batch::new()
        .with(env.approval(true))
        .with(update_rate())
        .with(deposit_collateral(market, collateral))
        .with(skim_collateral(env.user))
        .with(borrow(amount, env.user))
        .with(withdraw_borrowed(env.user))
}

// ============ Borrowing ============

#[test]
fn test_borrow_with_opening_fee() {
    for (fee_bps, expected_debt) in [(50, 1_005 * ONE / 10), (350, 1_035 * ONE / 10), (1_000, 110 * ONE)] {
        let mut env = setup(fee_bps, 0);
        let batch = open_position(&env, ONE, 100 * ONE);
        env.cook(&batch, START).unwrap();

        assert_eq!(env.debt_of(&env.user), expected_debt);
        assert_eq!(env.debt_tokens(), 100 * ONE);
        assert_eq!(env.market.state().accrue_info.fees_earned, expected_debt - 100 * ONE);
    }
}

#[test]
fn test_cook_reports_events_and_result() {
    let mut env = setup(50, 0);
    let batch = open_position(&env, ONE, 100 * ONE);
    let outcome = env.cook(&batch, START).unwrap();

    // Withdraw leaves (amount, share)
    assert_eq!(outcome.result, Some(StepResult::pair(100 * ONE, 100 * ONE)));
    let kinds: Vec<EventType> = outcome.events.iter().map(ChamberEvent::event_type).collect();
    assert!(kinds.contains(&EventType::DelegateApproval));
    assert!(kinds.contains(&EventType::Deposit));
    assert!(kinds.contains(&EventType::Withdraw));
    assert!(kinds.contains(&EventType::Borrow));
    assert!(kinds.contains(&EventType::ExchangeRate));
}

#[test]
fn test_interest_accrues_over_ten_days() {
    let mut env = setup(0, 500);
    let batch = open_position(&env, ONE, 100 * ONE);
    env.cook(&batch, START).unwrap();

    env.market.accrue(START + 864_000).unwrap();

    let debt = env.debt_of(&env.user);
    assert!(debt > 1_001_368 * ONE / 10_000, "debt {debt}");
    assert!(debt < 1_001_370 * ONE / 10_000, "debt {debt}");
    assert_eq!(env.market.state().accrue_info.fees_earned, debt - 100 * ONE);
}

#[test]
fn test_partial_repay_after_half_year() {
    let mut env = setup(0, 1_000);
    let market = env.market.address();
    // Borrowed shares stay in the vault for repayment
    let batch = Batch::new()
        .with(env.approval(true))
        .with(update_rate())
        .with(deposit_collateral(market, 10 * ONE))
        .with(skim_collateral(env.user))
        .with(borrow(1_000 * ONE, env.user));
    env.cook(&batch, START).unwrap();

    let later = START + 15_780_000;
    let repay = Batch::new()
        .with(Action::GetRepayPart(GetRepayPartParams {
            amount: Num::Value(1_000 * ONE),
        }))
        .with(Action::Repay(RepayParams {
            part: Num::PreviousFirst,
            to: env.user,
            skim: false,
        }));
    env.cook(&repay, later).unwrap();

    let remaining = env.debt_of(&env.user);
    assert!(remaining > 50 * ONE, "remaining {remaining}");
    assert!(remaining < 5_001 * ONE / 100, "remaining {remaining}");
}

#[test]
fn test_repay_share_matches_transfer() {
    let mut env = setup(50, 500);
    let market = env.market.address();
    let batch = Batch::new()
        .with(env.approval(true))
        .with(update_rate())
        .with(deposit_collateral(market, ONE))
        .with(skim_collateral(env.user))
        .with(borrow(100 * ONE, env.user));
    env.cook(&batch, START).unwrap();

    // Top up so the whole debt can be covered
    env.vault.custody_mut().mint(DEBT, env.user, 10 * ONE);
    let top_up = Batch::new().with(Action::VaultDeposit(VaultDepositParams {
        asset: DEBT,
        to: env.user,
        amount: Num::Value(10 * ONE),
        share: Num::Value(0),
    }));
    env.cook(&top_up, START).unwrap();

    let later = START + 86_400;
    let part = env.market.position_of(&env.user).borrow_part;
    let quote = Batch::new().with(Action::GetRepayShare(GetRepayShareParams { part: Num::Value(part) }));
    let quoted = env.cook(&quote, later).unwrap().result.unwrap().first;

    let before = env.vault.balance_of(&DEBT, &env.user);
    let repay = Batch::new().with(Action::Repay(RepayParams {
        part: Num::Value(part),
        to: env.user,
        skim: false,
    }));
    env.cook(&repay, later).unwrap();

    assert_eq!(before - env.vault.balance_of(&DEBT, &env.user), quoted);
    assert_eq!(env.market.position_of(&env.user).borrow_part, 0);
    assert_eq!(env.market.state().total_borrow.base, 0);
}

#[test]
fn test_remove_collateral_after_repay() {
    let mut env = setup(0, 0);
    let market = env.market.address();
    let open = Batch::new()
        .with(env.approval(true))
        .with(update_rate())
        .with(deposit_collateral(market, ONE))
        .with(skim_collateral(env.user))
        .with(borrow(100 * ONE, env.user));
    env.cook(&open, START).unwrap();

    // Cannot take collateral out while in debt beyond the threshold
    let remove = Batch::new().with(Action::RemoveCollateral(RemoveCollateralParams {
        share: Num::Value(ONE),
        to: env.user,
    }));
    assert_eq!(
        env.cook(&remove, START + 1),
        Err(ChamberError::Insolvent { user: env.user })
    );

    let close = Batch::new()
        .with(Action::Repay(RepayParams {
            part: Num::Value(100 * ONE),
            to: env.user,
            skim: false,
        }))
        .with(Action::RemoveCollateral(RemoveCollateralParams {
            share: Num::Value(ONE),
            to: env.user,
        }));
    env.cook(&close, START + 1).unwrap();

    assert_eq!(env.vault.balance_of(&COLLATERAL, &env.user), ONE);
    assert_eq!(env.market.state().total_collateral_share, 0);
    let position = env.market.position_of(&env.user);
    assert_eq!((position.collateral_share, position.borrow_part), (0, 0));
}

// ============ Atomicity ============

#[test]
fn test_insolvent_batch_leaves_no_trace() {
    let mut env = setup(50, 0);
    let vault_before = env.vault.clone();
    let state_before = env.market.state().clone();
    let events_before = env.market.events().len();

    // 1 collateral at 1000 supports at most 900 of debt
    let batch = open_position(&env, ONE, 900 * ONE);
    assert_eq!(
        env.cook(&batch, START),
        Err(ChamberError::Insolvent { user: env.user })
    );

    assert_eq!(env.market.state(), &state_before);
    assert_eq!(env.market.events().len(), events_before);
    assert_eq!(env.vault.nonce(&env.user), 0);
    assert!(!env.vault.is_approved(&env.user, &MASTER));
    assert_eq!(env.vault.events().len(), vault_before.events().len());
    assert_eq!(env.debt_tokens(), 0);
    assert_eq!(
        env.vault.custody().balance_of(&COLLATERAL, &env.user),
        vault_before.custody().balance_of(&COLLATERAL, &env.user)
    );
}

#[test]
fn test_failing_last_step_rolls_back_earlier_steps() {
    let mut env = setup(0, 0);
    let market = env.market.address();
    let batch = Batch::new()
        .with(env.approval(true))
        .with(deposit_collateral(market, ONE))
        .with(Action::Borrow(BorrowParams {
            amount: Num::Value(1),
            to: env.user,
        }))
        .with(Action::VaultWithdraw(VaultWithdrawParams {
            asset: DEBT,
            to: env.user,
            amount: Num::Value(0),
            // More shares than were borrowed
            share: Num::Value(2),
        }));

    assert!(matches!(
        env.cook(&batch, START),
        Err(ChamberError::InsufficientBalance { .. })
    ));
    assert_eq!(env.vault.balance_of(&COLLATERAL, &market), 0);
    assert_eq!(env.market.state().total_borrow.base, 0);
    assert_eq!(env.vault.nonce(&env.user), 0);
}

#[test]
fn test_solvency_judged_on_accrued_debt() {
    let mut env = setup(0, 1_000);
    let batch = open_position(&env, ONE, 899 * ONE);
    env.cook(&batch, START).unwrap();

    // A year at 10% takes the debt past the 900 threshold
    let later = START + 31_536_000;
    env.market
        .oracle_mut()
        .push_answer(&OPERATOR, PRICE_1000, later)
        .unwrap();
    let state_before = env.market.state().clone();

    let market = env.market.address();
    let top_up = Batch::new()
        .with(update_rate())
        .with(deposit_collateral(market, 1))
        .with(skim_collateral(env.user));
    assert_eq!(
        env.cook(&top_up, later),
        Err(ChamberError::Insolvent { user: env.user })
    );
    assert_eq!(env.market.state(), &state_before);
    assert_eq!(env.market.state().accrue_info.last_accrued, START);

    // Enough collateral clears the check with interest included
    let enough = Batch::new()
        .with(update_rate())
        .with(deposit_collateral(market, ONE / 5))
        .with(skim_collateral(env.user));
    env.cook(&enough, later).unwrap();
    assert_eq!(env.market.state().accrue_info.last_accrued, later);
    assert!(env.market.is_solvent(&env.vault, &env.user).unwrap());
}

#[test]
fn test_refused_transfer_rolls_back_batch() {
    let mut env = setup(0, 0);
    env.vault.custody_mut().freeze(VAULT);
    let totals_before = env.vault.totals(&COLLATERAL);
    let held_before = env.vault.custody().balance_of(&COLLATERAL, &env.user);

    let batch = Batch::new()
        .with(env.approval(true))
        .with(Action::VaultDeposit(VaultDepositParams {
            asset: COLLATERAL,
            to: env.user,
            amount: Num::Value(5 * ONE),
            share: Num::Value(0),
        }))
        .with(Action::VaultWithdraw(VaultWithdrawParams {
            asset: COLLATERAL,
            to: env.user,
            amount: Num::Value(0),
            share: Num::PreviousSecond,
        }));

    assert!(matches!(
        env.cook(&batch, START),
        Err(ChamberError::TransferFailed { .. })
    ));
    assert_eq!(env.vault.nonce(&env.user), 0);
    assert!(!env.vault.is_approved(&env.user, &MASTER));
    assert_eq!(env.vault.totals(&COLLATERAL), totals_before);
    assert_eq!(env.vault.balance_of(&COLLATERAL, &env.user), 0);
    assert_eq!(env.vault.custody().balance_of(&COLLATERAL, &env.user), held_before);
}

#[test]
fn test_committed_state_keeps_no_event_history() {
    let mut env = setup(0, 0);

    // Events of the setup calls are handed out with the first batch
    let first = env.cook(&Batch::new().with(env.approval(true)), START).unwrap();
    let kinds: Vec<EventType> = first.events.iter().map(ChamberEvent::event_type).collect();
    assert_eq!(
        kinds,
        vec![EventType::MarketDeployed, EventType::Deposit, EventType::DelegateApproval]
    );

    for _ in 0..5 {
        let deposit = Batch::new().with(Action::VaultDeposit(VaultDepositParams {
            asset: COLLATERAL,
            to: env.user,
            amount: Num::Value(ONE),
            share: Num::Value(0),
        }));
        let outcome = env.cook(&deposit, START).unwrap();
        assert_eq!(outcome.events.len(), 1);
        assert!(env.vault.events().is_empty());
        assert!(env.market.events().is_empty());
    }
    assert_eq!(env.vault.balance_of(&COLLATERAL, &env.user), 5 * ONE);
}

#[test]
fn test_empty_batch_is_noop() {
    let mut env = setup(0, 0);
    let state_before = env.market.state().clone();
    let outcome = env.cook(&Batch::new(), START).unwrap();

    assert_eq!(outcome, CookOutcome::default());
    assert_eq!(env.market.state(), &state_before);
}

#[test]
fn test_unknown_operation() {
    let mut env = setup(0, 0);
    let batch = Batch {
        actions: vec![99],
        values: vec![0],
        datas: vec![vec![]],
    };
    assert_eq!(
        env.cook(&batch, START),
        Err(ChamberError::UnknownOperation { code: 99 })
    );
}

#[test]
fn test_malformed_parameters() {
    let mut env = setup(0, 0);
    let batch = Batch {
        actions: vec![ACTION_BORROW],
        values: vec![0],
        datas: vec![vec![0xde, 0xad]],
    };
    assert!(matches!(
        env.cook(&batch, START),
        Err(ChamberError::DecodeError { code: ACTION_BORROW, .. })
    ));
}

#[test]
fn test_mismatched_sequences_rejected() {
    let mut env = setup(0, 0);
    let batch = Batch {
        actions: vec![ACTION_BORROW],
        values: vec![],
        datas: vec![vec![]],
    };
    assert!(matches!(
        env.cook(&batch, START),
        Err(ChamberError::InvalidBatch { .. })
    ));
}

#[test]
fn test_previous_result_required() {
    let mut env = setup(0, 0);
    let batch = Batch::new().with(Action::Borrow(BorrowParams {
        amount: Num::PreviousFirst,
        to: env.user,
    }));
    assert!(matches!(
        env.cook(&batch, START),
        Err(ChamberError::DecodeError { code: ACTION_BORROW, .. })
    ));

    // A step without a result clears the slot
    let market = env.market.address();
    let batch = Batch::new()
        .with(env.approval(true))
        .with(deposit_collateral(market, ONE))
        .with(skim_collateral(env.user))
        .with(Action::Borrow(BorrowParams {
            amount: Num::PreviousFirst,
            to: env.user,
        }));
    assert!(matches!(
        env.cook(&batch, START),
        Err(ChamberError::DecodeError { .. })
    ));
}

// ============ Approvals ============

#[test]
fn test_approval_replay_fails() {
    let mut env = setup(0, 0);
    let approval = env.approval(true);
    env.cook(&Batch::new().with(approval.clone()), START).unwrap();
    assert_eq!(env.vault.nonce(&env.user), 1);

    // Anyone may submit, but the consumed nonce cannot be reused
    assert_eq!(
        env.cook_as(STRANGER, &Batch::new().with(approval), START),
        Err(ChamberError::InvalidSignature)
    );
    assert_eq!(env.vault.nonce(&env.user), 1);
}

#[test]
fn test_market_cannot_move_funds_without_approval() {
    let mut env = setup(0, 0);
    let market = env.market.address();
    let batch = Batch::new().with(deposit_collateral(market, ONE));
    assert!(matches!(
        env.cook(&batch, START),
        Err(ChamberError::Unauthorized { .. })
    ));
}

#[test]
fn test_revoked_approval_blocks_market() {
    let mut env = setup(0, 0);
    env.cook(&Batch::new().with(env.approval(true)), START).unwrap();
    env.cook(&Batch::new().with(env.approval(false)), START).unwrap();

    let market = env.market.address();
    let batch = Batch::new().with(deposit_collateral(market, ONE));
    assert!(matches!(
        env.cook(&batch, START),
        Err(ChamberError::Unauthorized { .. })
    ));
}

// ============ Exchange Rate ============

#[test]
fn test_stale_rate_aborts_when_required() {
    let mut env = setup(0, 0);
    let later = START + 3_601;
    assert!(matches!(
        env.cook(&Batch::new().with(update_rate()), later),
        Err(ChamberError::StaleOrInvalidRate { .. })
    ));

    // Without must_update the cached rate is kept and returned
    let lenient = Action::UpdateExchangeRate(UpdateExchangeRateParams {
        must_update: false,
        min_rate: 0,
        max_rate: 0,
    });
    let outcome = env.cook(&Batch::new().with(lenient), later).unwrap();
    assert_eq!(outcome.result, Some(StepResult::single(0)));
}

#[test]
fn test_rate_bounds() {
    let mut env = setup(0, 0);
    let rate = 1_000 * ONE;
    let bounded = |min_rate, max_rate| {
        Batch::new().with(Action::UpdateExchangeRate(UpdateExchangeRateParams {
            must_update: true,
            min_rate,
            max_rate,
        }))
    };

    assert!(matches!(
        env.cook(&bounded(rate + 1, 0), START),
        Err(ChamberError::StaleOrInvalidRate { .. })
    ));
    assert!(matches!(
        env.cook(&bounded(0, rate - 1), START),
        Err(ChamberError::StaleOrInvalidRate { .. })
    ));
    assert_eq!(env.market.state().exchange_rate, 0);

    let outcome = env.cook(&bounded(rate, rate), START).unwrap();
    assert_eq!(outcome.result, Some(StepResult::single(rate)));
    assert_eq!(env.market.state().exchange_rate, rate);
}

#[test]
fn test_price_drop_makes_position_liquidatable() {
    let mut env = setup(0, 0);
    let batch = open_position(&env, ONE, 800 * ONE);
    env.cook(&batch, START).unwrap();
    let health = env.market.health(&env.vault, &env.user, START).unwrap();
    assert!(health.solvent);
    assert_eq!(health.pending_rate, Some(1_000 * ONE));

    env.market
        .oracle_mut()
        .push_answer(&OPERATOR, 500_00000000, START + 10)
        .unwrap();
    env.market.update_exchange_rate(START + 10).unwrap();

    let health = env.market.health(&env.vault, &env.user, START + 10).unwrap();
    assert!(!health.solvent);
    assert!(health.liquidatable);
    assert_eq!(health.liquidation_bps, 10_400);
    assert_eq!(health.pending_rate, Some(500 * ONE));

    // A stale feed has no rate to offer
    let stale = env.market.health(&env.vault, &env.user, START + 10 + 3_601).unwrap();
    assert_eq!(stale.pending_rate, None);
    assert!(stale.liquidatable);

    let view = env.market.position(&env.vault, &env.user).unwrap();
    assert_eq!(view.collateral_amount, ONE);
    assert_eq!(view.collateral_value, 500 * ONE);
    assert_eq!(view.debt_amount, 800 * ONE);
}

// ============ Vault Actions ============

#[test]
fn test_vault_transfer_action() {
    let mut env = setup(0, 0);
    let batch = Batch::new()
        .with(env.approval(true))
        .with(Action::VaultDeposit(VaultDepositParams {
            asset: COLLATERAL,
            to: env.user,
            amount: Num::Value(5 * ONE),
            share: Num::Value(0),
        }))
        .with(Action::VaultTransfer(VaultTransferParams {
            asset: COLLATERAL,
            to: STRANGER,
            share: Num::PreviousSecond,
        }));
    let outcome = env.cook(&batch, START).unwrap();

    assert_eq!(outcome.result, None);
    assert_eq!(env.vault.balance_of(&COLLATERAL, &STRANGER), 5 * ONE);
    assert_eq!(env.vault.balance_of(&COLLATERAL, &env.user), 0);
}

#[test]
fn test_add_collateral_from_vault_balance() {
    let mut env = setup(0, 0);
    let batch = Batch::new()
        .with(env.approval(true))
        .with(Action::VaultDeposit(VaultDepositParams {
            asset: COLLATERAL,
            to: env.user,
            amount: Num::Value(2 * ONE),
            share: Num::Value(0),
        }))
        .with(Action::AddCollateral(AddCollateralParams {
            share: Num::Value(2 * ONE),
            to: env.user,
            skim: false,
        }));
    env.cook(&batch, START).unwrap();

    assert_eq!(env.market.position_of(&env.user).collateral_share, 2 * ONE);
    assert_eq!(env.vault.balance_of(&COLLATERAL, &env.market.address()), 2 * ONE);
}

#[test]
fn test_skim_cannot_claim_tracked_collateral() {
    let mut env = setup(0, 0);
    let market = env.market.address();
    let batch = Batch::new()
        .with(env.approval(true))
        .with(deposit_collateral(market, ONE))
        .with(skim_collateral(env.user));
    env.cook(&batch, START).unwrap();

    // A second skim finds nothing unclaimed
    let again = Batch::new().with(Action::AddCollateral(AddCollateralParams {
        share: Num::Value(ONE),
        to: STRANGER,
        skim: true,
    }));
    assert!(matches!(
        env.cook_as(STRANGER, &again, START),
        Err(ChamberError::InsufficientBalance { .. })
    ));
}

// ============ External Calls ============

#[test]
fn test_call_appends_and_returns_values() {
    let mut env = setup(0, 0);
    let mut response = vec![0u8; 64];
    response[31] = 7;
    response[63] = 9;
    env.target.response = response;

    let market = env.market.address();
    let batch = Batch::new()
        .with(env.approval(true))
        .with(deposit_collateral(market, ONE))
        .with_value(
            Action::Call(CallParams {
                callee: HOOK,
                data: vec![0xAB],
                use_value1: true,
                use_value2: true,
                return_values: 2,
            }),
            3,
        );
    let outcome = env.cook(&batch, START).unwrap();

    assert_eq!(outcome.result, Some(StepResult::pair(7, 9)));
    let (callee, value, data) = &env.target.calls[0];
    assert_eq!(*callee, HOOK);
    assert_eq!(*value, 3);
    assert_eq!(data.len(), 1 + 64);
    assert_eq!(data[0], 0xAB);
    // Both deposited amount and share are one whole token
    assert_eq!(&data[17..33], &ONE.to_be_bytes());
    assert_eq!(&data[49..65], &ONE.to_be_bytes());
}

#[test]
fn test_call_cannot_target_vault_or_market() {
    let mut env = setup(0, 0);
    for callee in [VAULT, env.market.address()] {
        let batch = Batch::new().with(Action::Call(CallParams {
            callee,
            data: vec![],
            use_value1: false,
            use_value2: false,
            return_values: 0,
        }));
        assert_eq!(env.cook(&batch, START), Err(ChamberError::CallFailed { callee }));
    }
}

#[test]
fn test_reverted_call_rolls_back_target() {
    let mut env = setup(0, 0);
    let call = Action::Call(CallParams {
        callee: HOOK,
        data: vec![1],
        use_value1: false,
        use_value2: false,
        return_values: 0,
    });
    env.cook(&Batch::new().with(call.clone()), START).unwrap();
    assert_eq!(env.target.calls.len(), 1);

    env.target.revert = true;
    assert_eq!(
        env.cook(&Batch::new().with(call), START),
        Err(ChamberError::CallFailed { callee: HOOK })
    );
    assert_eq!(env.target.calls.len(), 1);
}

// ============ Administration ============

#[test]
fn test_withdraw_fees_to_sink() {
    let mut env = setup(50, 500);
    let batch = open_position(&env, ONE, 100 * ONE);
    env.cook(&batch, START).unwrap();

    assert_eq!(
        env.market.set_fee_to(&STRANGER, STRANGER),
        Err(ChamberError::OwnerOnly)
    );
    let sink = [0xFE; 20];
    env.market.set_fee_to(&OWNER, sink).unwrap();

    let later = START + 864_000;
    let settled = env.market.withdraw_fees(&mut env.vault, later).unwrap();
    assert!(settled > ONE / 2);
    assert_eq!(env.market.state().accrue_info.fees_earned, 0);
    // Debt asset stays 1:1 in the vault
    assert_eq!(env.vault.balance_of(&DEBT, &sink), settled);
}

#[test]
fn test_change_interest_rate_accrues_first() {
    let mut env = setup(0, 1_000);
    let batch = open_position(&env, ONE, 100 * ONE);
    env.cook(&batch, START).unwrap();

    assert_eq!(
        env.market.change_interest_rate(&STRANGER, 0, START + 100),
        Err(ChamberError::OwnerOnly)
    );

    let later = START + 864_000;
    env.market.change_interest_rate(&OWNER, 0, later).unwrap();
    let debt = env.debt_of(&env.user);
    assert!(debt > 100 * ONE);
    assert_eq!(env.market.state().accrue_info.last_accrued, later);

    // No further growth at the new rate
    env.market.accrue(later + 864_000).unwrap();
    assert_eq!(env.debt_of(&env.user), debt);
    assert_eq!(env.market.params().unwrap().interest_per_second, 0);
}

#[test]
fn test_reduce_supply() {
    let mut env = setup(0, 0);
    assert_eq!(
        env.market.reduce_supply(&mut env.vault, &STRANGER, ONE),
        Err(ChamberError::OwnerOnly)
    );

    let withdrawn = env.market.reduce_supply(&mut env.vault, &OWNER, 2 * SUPPLY).unwrap();
    assert_eq!(withdrawn, SUPPLY);
    assert_eq!(env.vault.custody().balance_of(&DEBT, &OWNER), SUPPLY);
    assert_eq!(env.vault.balance_of(&DEBT, &env.market.address()), 0);
}

#[test]
fn test_market_init_once() {
    let mut env = setup(0, 0);
    let init = env.market.params().unwrap().to_bytes();
    assert_eq!(env.market.init(&init, START), Err(ChamberError::AlreadyInitialized));

    let oracle = FeedOracle::new(OWNER, OPERATOR, PRICE_1000, 8, 3_600, START);
    let mut fresh = Chamber::new([0x99; 20], OWNER, DEBT, oracle);
    let bad = MarketInitParams {
        opening_fee_bps: 9_999,
        ..MarketInitParams::from_bytes(&init).unwrap()
    };
    assert!(matches!(
        fresh.init(&bad.to_bytes(), START),
        Err(ChamberError::InvalidInput { .. })
    ));
    let no_liquidation = MarketInitParams {
        liquidation_bps: 0,
        ..MarketInitParams::from_bytes(&init).unwrap()
    };
    assert_eq!(
        fresh.init(&no_liquidation.to_bytes(), START),
        Err(ChamberError::InvalidInput {
            param: "liquidation_bps",
            reason: "cannot be zero",
        })
    );
    assert!(matches!(
        fresh.init(&[1, 2, 3], START),
        Err(ChamberError::InvalidInput { .. })
    ));
}

#[test]
fn test_cbor_batch_runs() {
    let mut env = setup(50, 0);
    let batch = open_position(&env, ONE, 100 * ONE);
    let decoded = Batch::from_cbor(&batch.to_cbor().unwrap()).unwrap();
    env.cook(&decoded, START).unwrap();
    assert_eq!(env.debt_tokens(), 100 * ONE);
}

// ============ Properties ============

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_committed_batches_stay_solvent(
            collateral in 1u128..20,
            borrowed in 1u128..20_000,
        ) {
            let mut env = setup(50, 500);
            let state_before = env.market.state().clone();
            let batch = open_position(&env, collateral * ONE, borrowed * ONE);

            match env.cook(&batch, START) {
                Ok(_) => {
                    prop_assert!(env.market.is_solvent(&env.vault, &env.user).unwrap());
                }
                Err(err) => {
                    let expected = matches!(
                        err,
                        ChamberError::Insolvent { .. } | ChamberError::InsufficientBalance { .. }
                    );
                    prop_assert!(expected);
                    prop_assert_eq!(env.market.state(), &state_before);
                    prop_assert_eq!(env.vault.nonce(&env.user), 0);
                }
            }
        }
    }
}
