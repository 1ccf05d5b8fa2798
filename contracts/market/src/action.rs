//! Cook Actions
//!
//! Every step of a batch is an operation code plus a Borsh-encoded parameter
//! blob. Decoding turns the pair into a typed `Action`; numeric parameters
//! are `Num`s so a step can consume a value produced by the step before it.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use chamber_common::{
    errors::{ChamberError, ChamberResult},
    types::{Address, AssetId},
};
use chamber_vault::ApprovalSignature;

// ============ Operation Codes ============

pub const ACTION_REPAY: u8 = 2;
pub const ACTION_REMOVE_COLLATERAL: u8 = 4;
pub const ACTION_BORROW: u8 = 5;
pub const ACTION_GET_REPAY_SHARE: u8 = 6;
pub const ACTION_GET_REPAY_PART: u8 = 7;
pub const ACTION_ADD_COLLATERAL: u8 = 10;
pub const ACTION_UPDATE_EXCHANGE_RATE: u8 = 11;
pub const ACTION_VAULT_DEPOSIT: u8 = 20;
pub const ACTION_VAULT_WITHDRAW: u8 = 21;
pub const ACTION_VAULT_TRANSFER: u8 = 22;
pub const ACTION_SET_APPROVAL: u8 = 24;
pub const ACTION_CALL: u8 = 30;

// ============ Chained Values ============

/// A numeric parameter, literal or taken from the previous step's result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum Num {
    Value(u128),
    /// First value returned by the previous step
    PreviousFirst,
    /// Second value returned by the previous step
    PreviousSecond,
}

impl From<u128> for Num {
    fn from(value: u128) -> Self {
        Num::Value(value)
    }
}

/// Values a step hands to the next one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub first: u128,
    pub second: Option<u128>,
}

impl StepResult {
    pub fn single(first: u128) -> Self {
        Self { first, second: None }
    }

    pub fn pair(first: u128, second: u128) -> Self {
        Self {
            first,
            second: Some(second),
        }
    }
}

impl Num {
    /// Substitute the previous step's result where referenced
    pub fn resolve(&self, previous: Option<&StepResult>, code: u8) -> ChamberResult<u128> {
        match self {
            Num::Value(value) => Ok(*value),
            Num::PreviousFirst => previous.map(|p| p.first).ok_or(ChamberError::DecodeError {
                code,
                reason: "no previous result",
            }),
            Num::PreviousSecond => previous
                .and_then(|p| p.second)
                .ok_or(ChamberError::DecodeError {
                    code,
                    reason: "no second previous result",
                }),
        }
    }
}

// ============ Parameters ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct RepayParams {
    pub part: Num,
    pub to: Address,
    /// Take the shares from the vault's unclaimed balance
    pub skim: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct RemoveCollateralParams {
    pub share: Num,
    pub to: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct BorrowParams {
    pub amount: Num,
    pub to: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct GetRepayShareParams {
    pub part: Num,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct GetRepayPartParams {
    pub amount: Num,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AddCollateralParams {
    pub share: Num,
    pub to: Address,
    /// Take shares the market holds beyond its tracked collateral
    pub skim: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct UpdateExchangeRateParams {
    pub must_update: bool,
    /// Inclusive lower bound, zero for none
    pub min_rate: u128,
    /// Inclusive upper bound, zero for none
    pub max_rate: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct VaultDepositParams {
    pub asset: AssetId,
    pub to: Address,
    pub amount: Num,
    pub share: Num,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct VaultWithdrawParams {
    pub asset: AssetId,
    pub to: Address,
    pub amount: Num,
    pub share: Num,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct VaultTransferParams {
    pub asset: AssetId,
    pub to: Address,
    pub share: Num,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SetApprovalParams {
    pub user: Address,
    pub master: Address,
    pub approved: bool,
    pub signature: ApprovalSignature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CallParams {
    pub callee: Address,
    pub data: Vec<u8>,
    /// Append the previous first value as a 32-byte word
    pub use_value1: bool,
    /// Append the previous second value as a 32-byte word
    pub use_value2: bool,
    /// How many 32-byte words of the return data to pass on (0, 1 or 2)
    pub return_values: u8,
}

// ============ Action ============

/// A decoded batch step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Repay(RepayParams),
    RemoveCollateral(RemoveCollateralParams),
    Borrow(BorrowParams),
    GetRepayShare(GetRepayShareParams),
    GetRepayPart(GetRepayPartParams),
    AddCollateral(AddCollateralParams),
    UpdateExchangeRate(UpdateExchangeRateParams),
    VaultDeposit(VaultDepositParams),
    VaultWithdraw(VaultWithdrawParams),
    VaultTransfer(VaultTransferParams),
    SetApproval(SetApprovalParams),
    Call(CallParams),
}

fn decode_params<T: BorshDeserialize>(code: u8, data: &[u8]) -> ChamberResult<T> {
    borsh::from_slice(data).map_err(|_| ChamberError::DecodeError {
        code,
        reason: "malformed parameters",
    })
}

impl Action {
    /// Decode a step from its code and parameter blob
    pub fn decode(code: u8, data: &[u8]) -> ChamberResult<Self> {
        let action = match code {
            ACTION_REPAY => Action::Repay(decode_params(code, data)?),
            ACTION_REMOVE_COLLATERAL => Action::RemoveCollateral(decode_params(code, data)?),
            ACTION_BORROW => Action::Borrow(decode_params(code, data)?),
            ACTION_GET_REPAY_SHARE => Action::GetRepayShare(decode_params(code, data)?),
            ACTION_GET_REPAY_PART => Action::GetRepayPart(decode_params(code, data)?),
            ACTION_ADD_COLLATERAL => Action::AddCollateral(decode_params(code, data)?),
            ACTION_UPDATE_EXCHANGE_RATE => Action::UpdateExchangeRate(decode_params(code, data)?),
            ACTION_VAULT_DEPOSIT => Action::VaultDeposit(decode_params(code, data)?),
            ACTION_VAULT_WITHDRAW => Action::VaultWithdraw(decode_params(code, data)?),
            ACTION_VAULT_TRANSFER => Action::VaultTransfer(decode_params(code, data)?),
            ACTION_SET_APPROVAL => Action::SetApproval(decode_params(code, data)?),
            ACTION_CALL => {
                let params: CallParams = decode_params(code, data)?;
                if params.return_values > 2 {
                    return Err(ChamberError::DecodeError {
                        code,
                        reason: "return_values above 2",
                    });
                }
                Action::Call(params)
            }
            _ => return Err(ChamberError::UnknownOperation { code }),
        };
        Ok(action)
    }

    /// Operation code of this action
    pub fn code(&self) -> u8 {
        match self {
            Action::Repay(_) => ACTION_REPAY,
            Action::RemoveCollateral(_) => ACTION_REMOVE_COLLATERAL,
            Action::Borrow(_) => ACTION_BORROW,
            Action::GetRepayShare(_) => ACTION_GET_REPAY_SHARE,
            Action::GetRepayPart(_) => ACTION_GET_REPAY_PART,
            Action::AddCollateral(_) => ACTION_ADD_COLLATERAL,
            Action::UpdateExchangeRate(_) => ACTION_UPDATE_EXCHANGE_RATE,
            Action::VaultDeposit(_) => ACTION_VAULT_DEPOSIT,
            Action::VaultWithdraw(_) => ACTION_VAULT_WITHDRAW,
            Action::VaultTransfer(_) => ACTION_VAULT_TRANSFER,
            Action::SetApproval(_) => ACTION_SET_APPROVAL,
            Action::Call(_) => ACTION_CALL,
        }
    }

    /// Encode the parameter blob
    pub fn encode(&self) -> Vec<u8> {
        let encoded = match self {
            Action::Repay(p) => borsh::to_vec(p),
            Action::RemoveCollateral(p) => borsh::to_vec(p),
            Action::Borrow(p) => borsh::to_vec(p),
            Action::GetRepayShare(p) => borsh::to_vec(p),
            Action::GetRepayPart(p) => borsh::to_vec(p),
            Action::AddCollateral(p) => borsh::to_vec(p),
            Action::UpdateExchangeRate(p) => borsh::to_vec(p),
            Action::VaultDeposit(p) => borsh::to_vec(p),
            Action::VaultWithdraw(p) => borsh::to_vec(p),
            Action::VaultTransfer(p) => borsh::to_vec(p),
            Action::SetApproval(p) => borsh::to_vec(p),
            Action::Call(p) => borsh::to_vec(p),
        };
        encoded.unwrap_or_default()
    }
}
