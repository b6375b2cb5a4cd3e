//! Lazy interest accrual
//!
//! Interest is a lump sum computed from the time elapsed since the last
//! accrual, at the start of every ledger-mutating operation. There is no
//! background timer.

use crate::external::RateModel;
use crate::types::{MarketId, MarketState};
use crate::{Error, Result};
use alloy_primitives::U256;
use risk_engine::math::{checked_add, utilization, w_mul_down};
use risk_engine::Pool;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Result of one accrual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accrual {
    /// Seconds covered
    pub elapsed: u64,

    /// Per-second borrow rate used (WAD)
    pub rate: U256,

    /// Interest added to both borrow and supply totals
    pub interest: U256,

    /// Supply shares minted to the fee recipient
    pub fee_shares: U256,
}

/// Advance `state` to `now`
///
/// Returns `None` when no interest accrued: either no time elapsed, or
/// nothing is borrowed (the rate model is then not consulted, but the
/// timestamp still moves). Fee shares are added to the share total here;
/// crediting them to the recipient's position is the caller's job.
pub fn accrue(state: &mut MarketState, market: &MarketId, model: &dyn RateModel, now: u64) -> Result<Option<Accrual>> {
    let elapsed = now.saturating_sub(state.last_accrual);
    if elapsed == 0 {
        return Ok(None);
    }

    if state.total_borrow_assets.is_zero() {
        state.last_accrual = now;
        return Ok(None);
    }

    let utilization = utilization(state.total_supply_assets, state.total_borrow_assets)?;
    let rate = model.borrow_rate_per_second(market, utilization)?;

    let growth = rate
        .checked_mul(U256::from(elapsed))
        .ok_or_else(|| Error::Math(format!("rate {} over {}s overflows", rate, elapsed)))?;
    let interest = w_mul_down(state.total_borrow_assets, growth)?;

    state.total_borrow_assets = checked_add(state.total_borrow_assets, interest)?;
    state.total_supply_assets = checked_add(state.total_supply_assets, interest)?;

    let mut fee_shares = U256::ZERO;
    if !state.fee.is_zero() {
        let fee_amount = w_mul_down(interest, state.fee)?;
        // Priced so the recipient's new shares are worth exactly the fee
        let pool = Pool::new(state.total_supply_assets - fee_amount, state.total_supply_shares);
        fee_shares = pool.to_shares_down(fee_amount)?;
        state.total_supply_shares = checked_add(state.total_supply_shares, fee_shares)?;
    }

    state.last_accrual = now;

    debug!(
        market = %market,
        elapsed,
        rate = %rate,
        interest = %interest,
        fee_shares = %fee_shares,
        "Interest accrued"
    );

    Ok(Some(Accrual {
        elapsed,
        rate,
        interest,
        fee_shares,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::FixedRate;
    use crate::types::{AccountId, AssetId, MarketParams, OracleId, RateModelId};
    use risk_engine::WAD;

    fn market() -> MarketId {
        MarketParams {
            loan_asset: AssetId::new("USDC"),
            collateral_asset: AssetId::new("WETH"),
            oracle: OracleId::new("weth-usdc"),
            rate_model: RateModelId::new("fixed"),
            base_threshold: U256::ZERO,
        }
        .id()
    }

    fn units(n: u64) -> U256 {
        U256::from(n) * WAD
    }

    fn borrowed_state() -> MarketState {
        let mut state = MarketState::new(1_000, AccountId::new("treasury"));
        state.total_supply_assets = units(1_000);
        state.total_supply_shares = units(1_000) * risk_engine::VIRTUAL_SHARES;
        state.total_borrow_assets = units(500);
        state.total_borrow_shares = units(500) * risk_engine::VIRTUAL_SHARES;
        state
    }

    /// 1e-6 per second keeps the arithmetic round
    fn model() -> FixedRate {
        FixedRate::per_second(U256::from(1_000_000_000_000u64))
    }

    #[test]
    fn test_zero_elapsed_is_a_no_op() {
        let mut state = borrowed_state();
        let before = state.clone();
        assert_eq!(accrue(&mut state, &market(), &model(), 1_000).unwrap(), None);
        assert_eq!(state, before);
    }

    #[test]
    fn test_linear_interest() {
        let mut state = borrowed_state();
        let accrual = accrue(&mut state, &market(), &model(), 1_100).unwrap().unwrap();

        // 500 * 1e-6 * 100
        assert_eq!(accrual.interest, U256::from(50_000_000_000_000_000u64));
        assert_eq!(state.total_borrow_assets, units(500) + accrual.interest);
        assert_eq!(state.total_supply_assets, units(1_000) + accrual.interest);
        assert_eq!(state.last_accrual, 1_100);
        assert_eq!(accrual.fee_shares, U256::ZERO);
    }

    #[test]
    fn test_fee_shares_worth_the_fee() {
        let mut state = borrowed_state();
        state.fee = WAD / U256::from(10u8);
        let accrual = accrue(&mut state, &market(), &model(), 1_100).unwrap().unwrap();

        let fee_amount = accrual.interest / U256::from(10u8);
        let value = state.supply_pool().to_assets_down(accrual.fee_shares).unwrap();
        assert!(value <= fee_amount);
        assert!(fee_amount - value <= U256::from(1u8));
    }

    #[test]
    fn test_no_borrow_skips_rate_model() {
        #[derive(Debug)]
        struct Failing;
        impl RateModel for Failing {
            fn borrow_rate_per_second(
                &self,
                _market: &MarketId,
                _utilization: U256,
            ) -> std::result::Result<U256, crate::external::RateModelError> {
                Err(crate::external::RateModelError::Unavailable("down".to_string()))
            }
        }

        let mut state = MarketState::new(1_000, AccountId::new("treasury"));
        state.total_supply_assets = units(10);
        assert_eq!(accrue(&mut state, &market(), &Failing, 2_000).unwrap(), None);
        assert_eq!(state.last_accrual, 2_000);

        let mut borrowed = borrowed_state();
        assert!(matches!(
            accrue(&mut borrowed, &market(), &Failing, 2_000),
            Err(Error::RateModel(_))
        ));
    }
}
