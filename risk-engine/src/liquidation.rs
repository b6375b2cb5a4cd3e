//! Liquidation quoting
//!
//! Converts a liquidator's request (collateral to seize, or debt to repay)
//! into the exact amounts moved, applying the incentive factor, the
//! position caps and any bad debt left behind.
//!
//! Rounding always favours the pool: shares repaid for a seizure round up,
//! collateral seized for a repayment rounds down.

use crate::math::{mul_div_down, mul_div_up, w_div_up, w_mul_down, zero_floor_sub, ORACLE_PRICE_SCALE};
use crate::shares::Pool;
use crate::solvency::Exposure;
use crate::{Error, Result};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// What the liquidator asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationRequest {
    /// Seize this much collateral
    Seize(U256),
    /// Repay this many loan-asset units
    Repay(U256),
}

impl LiquidationRequest {
    /// Build from the two raw amounts; exactly one must be nonzero
    pub fn from_amounts(seized_assets: U256, repaid_assets: U256) -> Result<Self> {
        match (seized_assets.is_zero(), repaid_assets.is_zero()) {
            (false, true) => Ok(LiquidationRequest::Seize(seized_assets)),
            (true, false) => Ok(LiquidationRequest::Repay(repaid_assets)),
            (true, true) => Err(Error::AmbiguousRequest(
                "neither seized nor repaid amount given".to_string(),
            )),
            (false, false) => Err(Error::AmbiguousRequest(
                "both seized and repaid amounts given".to_string(),
            )),
        }
    }
}

/// Amounts a liquidation moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationQuote {
    /// Collateral transferred to the liquidator
    pub seized_assets: U256,

    /// Borrow shares burned against the liquidator's payment
    pub repaid_shares: U256,

    /// Loan-asset units the liquidator pays (rounded up)
    pub repaid_assets: U256,

    /// Borrow shares written off as bad debt
    pub bad_debt_shares: U256,

    /// Loan-asset units written off against suppliers
    pub bad_debt_assets: U256,

    /// Incentive factor applied (WAD)
    pub incentive_factor: U256,

    /// Position once the quote is applied
    pub remaining: Exposure,
}

impl LiquidationQuote {
    /// Whether the quote realizes bad debt
    pub fn has_bad_debt(&self) -> bool {
        !self.bad_debt_shares.is_zero()
    }
}

/// Quote a liquidation of `exposure`
///
/// The caller is responsible for having established that the position is
/// unhealthy. `borrow_pool` is the market's borrow pool before the
/// liquidation; `price` uses the oracle scale.
pub fn quote(
    request: LiquidationRequest,
    exposure: Exposure,
    borrow_pool: &Pool,
    price: U256,
    incentive_factor: U256,
) -> Result<LiquidationQuote> {
    if price.is_zero() {
        return Err(Error::ZeroPrice);
    }

    let (seized_assets, repaid_shares) = match request {
        LiquidationRequest::Seize(requested) => {
            let seized = requested.min(exposure.collateral);
            let shares = shares_for_seizure(seized, borrow_pool, price, incentive_factor)?;

            if shares > exposure.borrow_shares {
                let shares = exposure.borrow_shares;
                let seized = seizure_for_shares(shares, borrow_pool, price, incentive_factor)?
                    .min(exposure.collateral);
                (seized, shares)
            } else {
                (seized, shares)
            }
        }
        LiquidationRequest::Repay(requested) => {
            let shares = borrow_pool
                .to_shares_down(requested)?
                .min(exposure.borrow_shares);
            let seized = seizure_for_shares(shares, borrow_pool, price, incentive_factor)?;

            if seized > exposure.collateral {
                let seized = exposure.collateral;
                let shares = shares_for_seizure(seized, borrow_pool, price, incentive_factor)?
                    .min(exposure.borrow_shares);
                (seized, shares)
            } else {
                (seized, shares)
            }
        }
    };

    let repaid_assets = borrow_pool.to_assets_up(repaid_shares)?;

    let collateral_left = exposure.collateral - seized_assets;
    let shares_left = exposure.borrow_shares - repaid_shares;

    let (bad_debt_shares, bad_debt_assets) = if collateral_left.is_zero() && !shares_left.is_zero() {
        let pool_after = Pool::new(
            zero_floor_sub(borrow_pool.total_assets, repaid_assets),
            zero_floor_sub(borrow_pool.total_shares, repaid_shares),
        );
        let assets = pool_after
            .to_assets_up(shares_left)?
            .min(pool_after.total_assets);
        (shares_left, assets)
    } else {
        (U256::ZERO, U256::ZERO)
    };

    if seized_assets.is_zero() && repaid_shares.is_zero() && bad_debt_shares.is_zero() {
        return Err(Error::InvalidAmount(
            "liquidation would neither seize nor repay".to_string(),
        ));
    }

    Ok(LiquidationQuote {
        seized_assets,
        repaid_shares,
        repaid_assets,
        bad_debt_shares,
        bad_debt_assets,
        incentive_factor,
        remaining: Exposure {
            collateral: collateral_left,
            borrow_shares: shares_left - bad_debt_shares,
        },
    })
}

/// Borrow shares a seizure of `seized` collateral pays for (rounded up)
fn shares_for_seizure(seized: U256, pool: &Pool, price: U256, incentive_factor: U256) -> Result<U256> {
    let value = mul_div_up(seized, price, ORACLE_PRICE_SCALE)?;
    pool.to_shares_up(w_div_up(value, incentive_factor)?)
}

/// Collateral a repayment of `shares` buys (rounded down)
fn seizure_for_shares(shares: U256, pool: &Pool, price: U256, incentive_factor: U256) -> Result<U256> {
    let debt = pool.to_assets_down(shares)?;
    mul_div_down(w_mul_down(debt, incentive_factor)?, ORACLE_PRICE_SCALE, price)
}
