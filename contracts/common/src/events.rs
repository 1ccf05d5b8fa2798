//! Protocol Events for Chamber
//!
//! Events are emitted during batch execution and can be indexed off-chain.
//! An `EventLog` lives next to the state it describes, so a reverted batch
//! discards its events together with its state changes.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::types::{Address, AssetId, Timestamp};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Vault Events (0x01 - 0x1F)
    Deposit = 0x01,
    Withdraw = 0x02,
    Transfer = 0x03,
    DelegateApproval = 0x04,
    MarketDeployed = 0x05,

    // Market Events (0x20 - 0x3F)
    AddCollateral = 0x20,
    RemoveCollateral = 0x21,
    Borrow = 0x22,
    Repay = 0x23,
    Accrue = 0x24,
    ExchangeRate = 0x25,

    // Fee and Admin Events (0x40 - 0x5F)
    WithdrawFees = 0x40,
    FeeTo = 0x41,
    InterestChange = 0x42,
}

/// Main event enum containing all possible protocol events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum ChamberEvent {
    // ============ Vault Events ============

    /// Tokens entered custody and shares were credited
    Deposit {
        asset: AssetId,
        from: Address,
        to: Address,
        amount: u128,
        share: u128,
    },

    /// Shares were burned and tokens left custody
    Withdraw {
        asset: AssetId,
        from: Address,
        to: Address,
        amount: u128,
        share: u128,
    },

    /// Shares moved between two vault accounts
    Transfer {
        asset: AssetId,
        from: Address,
        to: Address,
        share: u128,
    },

    /// A user (dis)approved a delegate through a verified signature
    DelegateApproval {
        user: Address,
        delegate: Address,
        approved: bool,
    },

    /// A market instance was registered against its master
    MarketDeployed {
        master: Address,
        market: Address,
    },

    // ============ Market Events ============

    /// Collateral shares were credited to a position
    AddCollateral {
        from: Address,
        to: Address,
        share: u128,
    },

    /// Collateral shares left a position
    RemoveCollateral {
        from: Address,
        to: Address,
        share: u128,
    },

    /// Debt was opened against a position
    Borrow {
        from: Address,
        to: Address,
        amount: u128,
        fee: u128,
        part: u128,
    },

    /// Debt was repaid for a position
    Repay {
        from: Address,
        to: Address,
        amount: u128,
        part: u128,
    },

    /// Interest was accrued on the outstanding debt
    Accrue {
        interest: u128,
        timestamp: Timestamp,
    },

    /// The cached exchange rate was refreshed
    ExchangeRate { rate: u128 },

    // ============ Fee and Admin Events ============

    /// Accumulated fees were settled to the fee sink
    WithdrawFees { fee_to: Address, amount: u128 },

    /// The fee sink changed
    FeeTo { new_fee_to: Address },

    /// The per-second interest rate changed
    InterestChange { old_rate: u64, new_rate: u64 },
}

impl ChamberEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Deposit { .. } => EventType::Deposit,
            Self::Withdraw { .. } => EventType::Withdraw,
            Self::Transfer { .. } => EventType::Transfer,
            Self::DelegateApproval { .. } => EventType::DelegateApproval,
            Self::MarketDeployed { .. } => EventType::MarketDeployed,
            Self::AddCollateral { .. } => EventType::AddCollateral,
            Self::RemoveCollateral { .. } => EventType::RemoveCollateral,
            Self::Borrow { .. } => EventType::Borrow,
            Self::Repay { .. } => EventType::Repay,
            Self::Accrue { .. } => EventType::Accrue,
            Self::ExchangeRate { .. } => EventType::ExchangeRate,
            Self::WithdrawFees { .. } => EventType::WithdrawFees,
            Self::FeeTo { .. } => EventType::FeeTo,
            Self::InterestChange { .. } => EventType::InterestChange,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting multiple events during execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<ChamberEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: ChamberEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[ChamberEvent] {
        &self.events
    }

    /// Take all events, leaving the log empty
    pub fn drain(&mut self) -> Vec<ChamberEvent> {
        std::mem::take(&mut self.events)
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when no events were emitted
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
