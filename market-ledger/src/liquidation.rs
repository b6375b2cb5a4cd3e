//! Liquidation of unhealthy positions
//!
//! Health is judged at the borrower's effective threshold, after accrual.
//! The quote comes from `risk_engine::quote`; this module applies it to the
//! market totals and moves the tokens.

use crate::events::LedgerEvent;
use crate::external::TransferLeg;
use crate::market::Market;
use crate::types::{AccountId, Position};
use crate::{Error, Result};
use alloy_primitives::U256;
use risk_engine::math::{checked_sub, zero_floor_sub};
use risk_engine::{IncentiveInputs, LiquidationRequest};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Result of a committed liquidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationOutcome {
    /// Liquidated account
    pub borrower: AccountId,
    /// Collateral transferred to the liquidator
    pub seized_assets: U256,
    /// Loan-asset units the liquidator paid
    pub repaid_assets: U256,
    /// Borrow shares burned against the payment
    pub repaid_shares: U256,
    /// Debt written off against suppliers
    pub bad_debt_assets: U256,
    /// Borrow shares written off
    pub bad_debt_shares: U256,
    /// Incentive factor applied (WAD)
    pub incentive_factor: U256,
    /// Position before
    pub before: Position,
    /// Position after
    pub after: Position,
}

impl LiquidationOutcome {
    /// Whether debt was written off
    pub fn has_bad_debt(&self) -> bool {
        !self.bad_debt_shares.is_zero()
    }
}

impl Market {
    /// Liquidate `borrower`
    ///
    /// Exactly one of `seized_assets` and `repaid_assets` must be nonzero.
    /// When the borrower is left without collateral, its remaining debt is
    /// written off and the loss is borne by suppliers.
    pub fn liquidate(
        &mut self,
        liquidator: &AccountId,
        borrower: &AccountId,
        seized_assets: U256,
        repaid_assets: U256,
    ) -> Result<LiquidationOutcome> {
        let outcome = self.execute(|d| {
            d.accrue()?;

            let market = d.market;
            let env = &market.env;
            let before = d.position(borrower);
            if before.borrow_shares.is_zero() {
                return Err(Error::PositionHealthy(format!("{} has no debt", borrower)));
            }

            let threshold = env.risk.effective_threshold(&market.params, borrower);
            let price = env.risk.price(&market.params)?;
            let pool = d.state.borrow_pool();

            let report = risk_engine::assess(before.exposure(), &pool, price, threshold)?;
            if report.healthy {
                return Err(Error::PositionHealthy(format!(
                    "{} owes {} within borrowing power {}",
                    borrower, report.borrowed, report.max_borrow
                )));
            }

            let request = LiquidationRequest::from_amounts(seized_assets, repaid_assets)?;
            let incentive_factor = env.incentive.incentive_factor(&IncentiveInputs {
                threshold,
                health_factor: report.health_factor()?,
            })?;
            let quote = risk_engine::quote(request, before.exposure(), &pool, price, incentive_factor)?;

            let burned = checked_sub(d.state.total_borrow_shares, quote.repaid_shares)?;
            d.state.total_borrow_shares = checked_sub(burned, quote.bad_debt_shares)?;
            d.state.total_borrow_assets = zero_floor_sub(
                zero_floor_sub(d.state.total_borrow_assets, quote.repaid_assets),
                quote.bad_debt_assets,
            );
            d.state.total_supply_assets = zero_floor_sub(d.state.total_supply_assets, quote.bad_debt_assets);
            d.write_off_residual_debt();

            let after = Position {
                supply_shares: before.supply_shares,
                borrow_shares: quote.remaining.borrow_shares,
                collateral: quote.remaining.collateral,
            };
            d.set_position(borrower, after);

            d.legs.push(TransferLeg::Deposit {
                asset: market.params.loan_asset.clone(),
                from: liquidator.clone(),
                amount: quote.repaid_assets,
            });
            d.legs.push(TransferLeg::Release {
                asset: market.params.collateral_asset.clone(),
                to: liquidator.clone(),
                amount: quote.seized_assets,
            });
            d.events.push(LedgerEvent::Liquidated {
                liquidator: liquidator.clone(),
                borrower: borrower.clone(),
                seized_assets: quote.seized_assets,
                repaid_assets: quote.repaid_assets,
                repaid_shares: quote.repaid_shares,
                bad_debt_assets: quote.bad_debt_assets,
                bad_debt_shares: quote.bad_debt_shares,
                before,
                after,
            });

            Ok(LiquidationOutcome {
                borrower: borrower.clone(),
                seized_assets: quote.seized_assets,
                repaid_assets: quote.repaid_assets,
                repaid_shares: quote.repaid_shares,
                bad_debt_assets: quote.bad_debt_assets,
                bad_debt_shares: quote.bad_debt_shares,
                incentive_factor,
                before,
                after,
            })
        })?;

        self.env.metrics.record_liquidation(outcome.has_bad_debt());
        info!(
            market = %self.id,
            liquidator = %liquidator,
            borrower = %borrower,
            seized = %outcome.seized_assets,
            repaid = %outcome.repaid_assets,
            "Position liquidated"
        );
        if outcome.has_bad_debt() {
            warn!(
                market = %self.id,
                borrower = %borrower,
                bad_debt = %outcome.bad_debt_assets,
                "Bad debt realized"
            );
        }

        Ok(outcome)
    }
}
