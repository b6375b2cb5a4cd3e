//! Core types for the ledger
//!
//! Amounts, shares and ratios are `U256`. Ratios are WAD-scaled
//! (`1e18 == 1.0`); oracle prices are scaled by `1e36`.

use alloy_primitives::{B256, U256};
use risk_engine::{Exposure, Pool};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Create new identifier
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get as string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Account identifier (lender, borrower, liquidator, owner)
    AccountId
);

string_id!(
    /// Token identifier (loan or collateral asset)
    AssetId
);

string_id!(
    /// Reference to a registered price oracle
    OracleId
);

string_id!(
    /// Reference to a registered interest-rate model
    RateModelId
);

/// Content-derived market identifier
///
/// SHA-256 over the length-prefixed market parameters; identical parameters
/// always yield the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketId(B256);

impl MarketId {
    /// Derive the id of a parameter tuple
    pub fn of(params: &MarketParams) -> Self {
        let mut hasher = Sha256::new();
        for part in [
            params.loan_asset.as_str(),
            params.collateral_asset.as_str(),
            params.oracle.as_str(),
            params.rate_model.as_str(),
        ] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        hasher.update(params.base_threshold.to_be_bytes::<32>());

        let digest: [u8; 32] = hasher.finalize().into();
        Self(B256::from(digest))
    }

    /// Raw digest
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0 .0
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable market parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketParams {
    /// Asset lent and borrowed
    pub loan_asset: AssetId,

    /// Asset pledged as collateral
    pub collateral_asset: AssetId,

    /// Price source (collateral quoted in loan asset)
    pub oracle: OracleId,

    /// Borrow-rate model
    pub rate_model: RateModelId,

    /// Base threshold (WAD, below 1.0)
    pub base_threshold: U256,
}

impl MarketParams {
    /// Market id of these parameters
    pub fn id(&self) -> MarketId {
        MarketId::of(self)
    }
}

/// Mutable market totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketState {
    /// Assets owed to suppliers
    pub total_supply_assets: U256,

    /// Supply shares outstanding
    pub total_supply_shares: U256,

    /// Assets owed by borrowers
    pub total_borrow_assets: U256,

    /// Borrow shares outstanding
    pub total_borrow_shares: U256,

    /// Unix seconds of the last accrual
    pub last_accrual: u64,

    /// Protocol fee on interest (WAD)
    pub fee: U256,

    /// Receives supply shares minted for the fee
    pub fee_recipient: AccountId,
}

impl MarketState {
    /// Empty market created at `now`
    pub fn new(now: u64, fee_recipient: AccountId) -> Self {
        Self {
            total_supply_assets: U256::ZERO,
            total_supply_shares: U256::ZERO,
            total_borrow_assets: U256::ZERO,
            total_borrow_shares: U256::ZERO,
            last_accrual: now,
            fee: U256::ZERO,
            fee_recipient,
        }
    }

    /// Supply pool totals
    pub fn supply_pool(&self) -> Pool {
        Pool::new(self.total_supply_assets, self.total_supply_shares)
    }

    /// Borrow pool totals
    pub fn borrow_pool(&self) -> Pool {
        Pool::new(self.total_borrow_assets, self.total_borrow_shares)
    }

    /// `total_borrow_assets <= total_supply_assets`
    pub fn is_liquid(&self) -> bool {
        self.total_borrow_assets <= self.total_supply_assets
    }
}

/// One account's holdings in one market
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Supply shares held
    pub supply_shares: U256,

    /// Borrow shares owed
    pub borrow_shares: U256,

    /// Raw collateral amount
    pub collateral: U256,
}

impl Position {
    /// Collateral and debt view used by solvency checks
    pub fn exposure(&self) -> Exposure {
        Exposure {
            collateral: self.collateral,
            borrow_shares: self.borrow_shares,
        }
    }

    /// Whether every balance is zero
    pub fn is_empty(&self) -> bool {
        self.supply_shares.is_zero() && self.borrow_shares.is_zero() && self.collateral.is_zero()
    }
}

/// Amount given either in assets or in shares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantity {
    /// Asset units
    Assets(U256),
    /// Pool shares
    Shares(U256),
}

impl Quantity {
    /// Whether the amount is zero
    pub fn is_zero(&self) -> bool {
        match self {
            Quantity::Assets(v) | Quantity::Shares(v) => v.is_zero(),
        }
    }
}

/// Both sides of a supply/withdraw/borrow/repay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetsShares {
    /// Asset units moved
    pub assets: U256,
    /// Shares minted or burned
    pub shares: U256,
}
