//! Protocol Constants
//!
//! All magic numbers and configuration values for the Chamber market.
//!
//! # Network Configuration
//!
//! Use feature flags to compile for different networks:
//! - `mainnet` - Production values (mainnet chain id for signed approvals)
//! - Default (no feature) - Local development values
//!
//! ```toml
//! # For mainnet deployment:
//! chamber-common = { path = "...", features = ["mainnet"] }
//! ```

/// Precision constants
pub mod precision {
    /// Fixed-point scale for exchange rates and per-second interest (1e18)
    pub const EXCHANGE_RATE_PRECISION: u128 = 1_000_000_000_000_000_000;

    /// Fixed-point scale for per-second interest rates (1e18)
    pub const INTEREST_PRECISION: u128 = 1_000_000_000_000_000_000;

    /// One whole token with 18 decimals
    pub const ONE: u128 = 1_000_000_000_000_000_000;
}

/// Fee and threshold configuration (in basis points, 100 = 1%)
pub mod fees {
    /// Basis points denominator
    pub const BPS_DENOMINATOR: u128 = 10_000;

    /// Upper bound for the borrow opening fee (50%)
    pub const MAX_OPENING_FEE_BPS: u64 = 5_000;

    /// Upper bound for the collateralization threshold (100% LTV)
    pub const MAX_COLLATERALIZATION_BPS: u64 = 10_000;
}

/// Time-related constants
pub mod time {
    /// Seconds in a Julian year (365.25 days), used for APR conversions
    pub const SECONDS_PER_YEAR: u64 = 31_557_600;
}

/// Vault configuration
pub mod vault {
    /// Asset id standing for the chain's native asset in deposit parameters
    pub const NATIVE_ASSET: [u8; 20] = [0u8; 20];
}

/// Delegated approval (typed signature) configuration
pub mod approval {
    /// Domain name the approval signatures are bound to
    pub const DOMAIN_NAME: &str = "BentoBox V1";

    /// Warning string embedded in a granting approval
    pub const APPROVAL_WARNING: &str = "Give FULL access to funds in (and approved to) BentoBox?";

    /// Warning string embedded in a revoking approval
    pub const REVOKE_WARNING: &str = "Revoke access to BentoBox?";

    /// Chain id the approval domain is bound to
    /// - Mainnet: 1
    /// - Local development: 31337
    #[cfg(feature = "mainnet")]
    pub const DEFAULT_CHAIN_ID: u64 = 1;
    #[cfg(not(feature = "mainnet"))]
    pub const DEFAULT_CHAIN_ID: u64 = 31_337;
}

/// Cook interpreter configuration
pub mod cook {
    /// Maximum number of steps accepted in a single batch
    pub const MAX_BATCH_SIZE: usize = 64;
}
