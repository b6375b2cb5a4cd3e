//! Risk Engine for tiered lending markets
//!
//! Pure, state-free arithmetic behind the market ledger: fixed-point math,
//! virtual-share conversions, credit-tier thresholds, solvency assessment,
//! liquidation incentives and liquidation quoting. Nothing here performs
//! I/O; every function is a deterministic function of its arguments.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod incentive;
pub mod liquidation;
pub mod math;
pub mod shares;
pub mod solvency;
pub mod threshold;

pub use error::{Error, Result};
pub use incentive::{CursorCurve, HealthScaledCurve, IncentiveConfig, IncentiveCurve, IncentiveInputs};
pub use liquidation::{quote, LiquidationQuote, LiquidationRequest};
pub use math::{Rounding, ORACLE_PRICE_SCALE, WAD};
pub use shares::{Pool, VIRTUAL_ASSETS, VIRTUAL_SHARES};
pub use solvency::{assess, Exposure, SolvencyReport};
pub use threshold::{CreditTier, TierLabel};
