//! Error Types for the Chamber Protocol
//!
//! Every failure aborts the enclosing batch as a whole. The variants carry
//! enough context to tell the caller exactly why, and `code()` gives a stable
//! identifier for logs.

use thiserror::Error;

use crate::types::{Address, AssetId};

/// Result type alias for Chamber operations
pub type ChamberResult<T> = Result<T, ChamberError>;

/// Main error enum for all Chamber protocol errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChamberError {
    // ============ Vault Errors ============
    /// Owner's share balance is lower than the share being debited
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: u128, requested: u128 },

    /// Underlying token movement into or out of custody did not succeed
    #[error("transfer of {amount} failed")]
    TransferFailed {
        asset: AssetId,
        from: Address,
        to: Address,
        amount: u128,
    },

    /// Caller may not move funds on behalf of `owner`
    #[error("caller not authorized to act for owner")]
    Unauthorized { owner: Address, caller: Address },

    // ============ Approval Errors ============
    /// Recovered signer does not match the approving user
    #[error("invalid signature")]
    InvalidSignature,

    // ============ Oracle Errors ============
    /// Feed could not produce a rate, or the rate fell outside the bounds
    #[error("stale or invalid exchange rate {rate}")]
    StaleOrInvalidRate { rate: u128 },

    // ============ Market Errors ============
    /// Position violates the collateralization invariant
    #[error("user insolvent")]
    Insolvent { user: Address },

    /// Market was already initialized
    #[error("market already initialized")]
    AlreadyInitialized,

    /// Only the market owner can perform this action
    #[error("owner only")]
    OwnerOnly,

    // ============ Cook Errors ============
    /// Operation code not recognized by the interpreter
    #[error("unknown operation {code}")]
    UnknownOperation { code: u8 },

    /// Parameter blob could not be decoded for a recognized operation
    #[error("cannot decode parameters for operation {code}: {reason}")]
    DecodeError { code: u8, reason: &'static str },

    /// Batch sequences are inconsistent
    #[error("invalid batch: {reason}")]
    InvalidBatch { reason: &'static str },

    /// External pass-through call reverted
    #[error("external call failed")]
    CallFailed { callee: Address },

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    /// Division by zero
    #[error("division by zero")]
    DivisionByZero,

    // ============ Input Validation Errors ============
    /// Invalid input parameter
    #[error("invalid input {param}: {reason}")]
    InvalidInput { param: &'static str, reason: &'static str },
}

impl ChamberError {
    /// Returns a human-readable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientBalance { .. } => "E011_INSUFFICIENT_BALANCE",
            Self::TransferFailed { .. } => "E012_TRANSFER_FAILED",
            Self::Unauthorized { .. } => "E020_UNAUTHORIZED",
            Self::InvalidSignature => "E022_INVALID_SIGNATURE",
            Self::StaleOrInvalidRate { .. } => "E030_RATE_NOT_OK",
            Self::Insolvent { .. } => "E040_INSOLVENT",
            Self::AlreadyInitialized => "E041_ALREADY_INIT",
            Self::OwnerOnly => "E042_OWNER_ONLY",
            Self::UnknownOperation { .. } => "E050_UNKNOWN_OP",
            Self::DecodeError { .. } => "E051_DECODE",
            Self::InvalidBatch { .. } => "E052_INVALID_BATCH",
            Self::CallFailed { .. } => "E053_CALL_FAILED",
            Self::ArithmeticOverflow => "E080_OVERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
            Self::InvalidInput { .. } => "E090_INVALID_INPUT",
        }
    }

    /// Returns true if resubmitting an amended batch can fix the failure
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Insolvent { .. }
                | Self::InsufficientBalance { .. }
                | Self::StaleOrInvalidRate { .. }
                | Self::InvalidSignature
        )
    }
}
