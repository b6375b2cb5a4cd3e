//! Position solvency
//!
//! A position is solvent iff
//! `toAssetsUp(borrowShares) <= collateral * price / 1e36 * threshold`.
//! Debt is rounded up and borrowing power down, so rounding never counts in
//! the borrower's favour.

use crate::math::{mul_div_down, w_div_down, w_mul_down, ORACLE_PRICE_SCALE};
use crate::shares::Pool;
use crate::{Error, Result};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Collateral and debt held by one account in one market
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exposure {
    /// Raw collateral amount
    pub collateral: U256,

    /// Borrow shares owed
    pub borrow_shares: U256,
}

/// Outcome of a solvency evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolvencyReport {
    /// Debt in loan-asset units (rounded up)
    pub borrowed: U256,

    /// Collateral value in loan-asset units (rounded down)
    pub collateral_value: U256,

    /// Maximum debt the collateral supports at `threshold`
    pub max_borrow: U256,

    /// Threshold the evaluation used
    pub threshold: U256,

    /// `borrowed <= max_borrow`
    pub healthy: bool,
}

impl SolvencyReport {
    /// `max_borrow / borrowed` in WAD; `U256::MAX` without debt
    pub fn health_factor(&self) -> Result<U256> {
        if self.borrowed.is_zero() {
            return Ok(U256::MAX);
        }
        w_div_down(self.max_borrow, self.borrowed)
    }

    /// Debt exceeding borrowing power (zero when healthy)
    pub fn shortfall(&self) -> U256 {
        self.borrowed.saturating_sub(self.max_borrow)
    }
}

/// Collateral value in loan-asset units, rounded down
pub fn collateral_value(collateral: U256, price: U256) -> Result<U256> {
    if price.is_zero() {
        return Err(Error::ZeroPrice);
    }
    mul_div_down(collateral, price, ORACLE_PRICE_SCALE)
}

/// Evaluate an exposure against the borrow pool, a price and a threshold
///
/// Pure: reads nothing but its arguments, so callers may evaluate a
/// prospective state before committing it.
pub fn assess(
    exposure: Exposure,
    borrow_pool: &Pool,
    price: U256,
    threshold: U256,
) -> Result<SolvencyReport> {
    let borrowed = borrow_pool.to_assets_up(exposure.borrow_shares)?;
    let collateral_value = collateral_value(exposure.collateral, price)?;
    let max_borrow = w_mul_down(collateral_value, threshold)?;

    Ok(SolvencyReport {
        borrowed,
        collateral_value,
        max_borrow,
        threshold,
        healthy: borrowed <= max_borrow,
    })
}
