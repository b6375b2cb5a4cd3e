//! Tiered Markets Ledger
//!
//! Isolated collateralized lending markets with credit-tier liquidation
//! thresholds.
//!
//! # Architecture
//!
//! - **Isolated markets**: each market is identified by the hash of its
//!   immutable parameters and owned by a single actor task
//! - **Atomic operations**: every operation runs on a draft; the draft is
//!   committed only after all checks and token transfers succeed
//! - **Credit tiers**: a borrower's attested tier may raise its liquidation
//!   threshold above the market's base threshold
//! - **Pluggable collaborators**: oracles, rate models, credit attestation,
//!   token custody and time are traits
//!
//! # Invariants
//!
//! - Supply covers borrows: `total_borrow_assets <= total_supply_assets`
//! - Positions sum to totals for supply and borrow shares
//! - Every committed borrow or collateral withdrawal leaves its position solvent
//! - A failed operation changes nothing

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod external;
pub mod interest;
pub mod ledger;
pub mod liquidation;
pub mod market;
pub mod metrics;
pub mod registry;
pub mod risk;
pub mod types;

// Re-exports
pub use config::{BootstrapConfig, Config, MarketConfig};
pub use context::{Collaborators, Environment};
pub use error::{Error, Result};
pub use events::{EventEnvelope, LedgerEvent};
pub use ledger::Ledger;
pub use liquidation::LiquidationOutcome;
pub use market::MarketSnapshot;
pub use types::{
    AccountId, AssetId, AssetsShares, MarketId, MarketParams, MarketState, OracleId, Position, Quantity,
    RateModelId,
};
