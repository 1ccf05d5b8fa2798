//! Chamber Common Library
//!
//! Shared types, constants, and utilities for all Chamber crates.
//!
//! ## Accounting Model
//!
//! - **Vault shares**: pooled custody is tracked as shares of each asset's
//!   total amount (`Rebase { elastic: amount, base: shares }`)
//! - **Borrow parts**: market debt is tracked as parts of the total owed
//!   (`Rebase { elastic: debt, base: parts }`), so interest compounds on the
//!   total without touching every position
//! - **Protocol-favoring rounding**: every conversion rounds against the
//!   caller
//!
//! ## Modules
//!
//! - **constants**: precision scales, fee bounds, approval domain defaults
//! - **errors**: the protocol-wide `ChamberError` taxonomy
//! - **types**: identities and the `Rebase` pair
//! - **math**: 256-bit-intermediate fixed-point helpers
//! - **events**: indexable protocol events and the `EventLog`

pub mod constants;
pub mod errors;
pub mod events;
pub mod math;
pub mod types;

// Re-exports for convenience
pub use constants::*;
pub use errors::*;
pub use events::*;
pub use math::*;
pub use types::*;
