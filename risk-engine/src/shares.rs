//! Share accounting with a virtual offset
//!
//! Every conversion adds `VIRTUAL_SHARES` to the share total and
//! `VIRTUAL_ASSETS` to the asset total. The empty pool therefore prices a
//! share at `1 / VIRTUAL_SHARES` assets and cannot be inflated by a first
//! depositor or by draining the pool to zero.

use crate::math::{mul_div, Rounding};
use crate::Result;
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Virtual shares added to the share total of every pool (1e6)
pub const VIRTUAL_SHARES: U256 = U256::from_limbs([1_000_000, 0, 0, 0]);

/// Virtual assets added to the asset total of every pool
pub const VIRTUAL_ASSETS: U256 = U256::from_limbs([1, 0, 0, 0]);

/// Totals of one share pool (supply side or borrow side)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Assets owed to (or by) the holders of the pool's shares
    pub total_assets: U256,

    /// Shares outstanding
    pub total_shares: U256,
}

impl Pool {
    /// Create a pool from its totals
    pub fn new(total_assets: U256, total_shares: U256) -> Self {
        Self {
            total_assets,
            total_shares,
        }
    }

    /// Shares worth `assets`, rounded as requested
    pub fn to_shares(&self, assets: U256, rounding: Rounding) -> Result<U256> {
        mul_div(
            assets,
            self.total_shares + VIRTUAL_SHARES,
            self.total_assets + VIRTUAL_ASSETS,
            rounding,
        )
    }

    /// Assets worth `shares`, rounded as requested
    pub fn to_assets(&self, shares: U256, rounding: Rounding) -> Result<U256> {
        mul_div(
            shares,
            self.total_assets + VIRTUAL_ASSETS,
            self.total_shares + VIRTUAL_SHARES,
            rounding,
        )
    }

    /// Shares worth `assets`, rounded down
    pub fn to_shares_down(&self, assets: U256) -> Result<U256> {
        self.to_shares(assets, Rounding::Down)
    }

    /// Shares worth `assets`, rounded up
    pub fn to_shares_up(&self, assets: U256) -> Result<U256> {
        self.to_shares(assets, Rounding::Up)
    }

    /// Assets worth `shares`, rounded down
    pub fn to_assets_down(&self, shares: U256) -> Result<U256> {
        self.to_assets(shares, Rounding::Down)
    }

    /// Assets worth `shares`, rounded up
    pub fn to_assets_up(&self, shares: U256) -> Result<U256> {
        self.to_assets(shares, Rounding::Up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::WAD;
    use proptest::prelude::*;

    #[test]
    fn test_empty_pool_price() {
        let pool = Pool::default();
        let shares = pool.to_shares_down(WAD).unwrap();
        assert_eq!(shares, WAD * VIRTUAL_SHARES);
        assert_eq!(pool.to_assets_down(shares).unwrap(), WAD);
    }

    #[test]
    fn test_donation_does_not_zero_next_deposit() {
        // Attacker holds one share and donates a large amount to the pool
        let pool = Pool::new(U256::from(1_000u64) * WAD, U256::from(1u8));
        let victim_shares = pool.to_shares_down(WAD).unwrap();

        // The virtual offset keeps the victim's deposit worth a share
        assert!(victim_shares > U256::ZERO);
    }

    #[test]
    fn test_rounding_directions_differ() {
        let pool = Pool::new(U256::from(3u8), U256::from(7_000_001u64));
        let down = pool.to_shares_down(U256::from(1u8)).unwrap();
        let up = pool.to_shares_up(U256::from(1u8)).unwrap();
        assert!(up >= down);
        assert!(up - down <= U256::from(1u8));
    }

    proptest! {
        #[test]
        fn prop_supply_round_trip_never_favors_user(
            assets in 1u128..1_000_000_000_000_000_000_000_000u128,
            total_assets in 0u128..1_000_000_000_000_000_000_000_000u128,
            extra_shares in 0u128..1_000_000_000_000u128,
        ) {
            let total_assets = U256::from(total_assets);
            let total_shares = total_assets * VIRTUAL_SHARES + U256::from(extra_shares);
            let pool = Pool::new(total_assets, total_shares);

            let assets = U256::from(assets);
            let shares = pool.to_shares_down(assets).unwrap();
            prop_assert!(pool.to_assets_down(shares).unwrap() <= assets);
        }

        #[test]
        fn prop_withdraw_round_trip_never_favors_user(
            shares in 1u128..1_000_000_000_000_000_000_000_000u128,
            total_assets in 0u128..1_000_000_000_000_000_000_000_000u128,
            extra_shares in 0u128..1_000_000_000_000u128,
        ) {
            let total_assets = U256::from(total_assets);
            let total_shares = total_assets * VIRTUAL_SHARES + U256::from(extra_shares);
            let pool = Pool::new(total_assets, total_shares);

            let shares = U256::from(shares);
            let assets = pool.to_assets_down(shares).unwrap();
            prop_assert!(pool.to_shares_up(assets).unwrap() <= shares);

            let assets_up = pool.to_assets_up(shares).unwrap();
            prop_assert!(pool.to_shares_down(assets_up).unwrap() >= shares);
        }
    }
}
