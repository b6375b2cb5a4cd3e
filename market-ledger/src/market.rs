//! Per-market ledger
//!
//! A [`Market`] owns one market's totals and positions. Every operation runs
//! against a [`Draft`]: a copy of the totals plus the positions it touched.
//! Interest is accrued into the draft first, then the operation mutates and
//! checks it. Only when every check passed and the token legs settled is the
//! draft committed and its events published. A failed operation leaves the
//! market exactly as it was, accrual included.

use crate::context::Environment;
use crate::events::LedgerEvent;
use crate::external::{settle, RateModel, TransferLeg};
use crate::interest;
use crate::types::{AccountId, AssetsShares, MarketId, MarketParams, MarketState, Position, Quantity};
use crate::{Error, Result};
use alloy_primitives::U256;
use risk_engine::math::{checked_add, checked_sub, zero_floor_sub};
use risk_engine::SolvencyReport;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Committed view of a market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Market id
    pub id: MarketId,
    /// Immutable parameters
    pub params: MarketParams,
    /// Totals as of the last committed operation
    pub state: MarketState,
}

/// One market's ledger
#[derive(Debug)]
pub struct Market {
    pub(crate) id: MarketId,
    pub(crate) params: MarketParams,
    pub(crate) state: MarketState,
    pub(crate) positions: HashMap<AccountId, Position>,
    pub(crate) rate_model: Arc<dyn RateModel>,
    pub(crate) env: Arc<Environment>,
}

/// Uncommitted changes of one operation
pub(crate) struct Draft<'a> {
    pub(crate) market: &'a Market,
    pub(crate) state: MarketState,
    pub(crate) events: Vec<LedgerEvent>,
    pub(crate) legs: Vec<TransferLeg>,
    pub(crate) now: u64,
    touched: HashMap<AccountId, Position>,
}

impl<'a> Draft<'a> {
    fn new(market: &'a Market) -> Self {
        Self {
            market,
            state: market.state.clone(),
            events: Vec::new(),
            legs: Vec::new(),
            now: market.env.now(),
            touched: HashMap::new(),
        }
    }

    /// Position as modified so far
    pub(crate) fn position(&self, account: &AccountId) -> Position {
        self.touched
            .get(account)
            .or_else(|| self.market.positions.get(account))
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn set_position(&mut self, account: &AccountId, position: Position) {
        self.touched.insert(account.clone(), position);
    }

    /// Bring the draft's totals up to `now`
    pub(crate) fn accrue(&mut self) -> Result<()> {
        let market = self.market;
        let accrual = interest::accrue(&mut self.state, &market.id, market.rate_model.as_ref(), self.now)?;

        if let Some(accrual) = accrual {
            if !accrual.fee_shares.is_zero() {
                let recipient = self.state.fee_recipient.clone();
                let mut position = self.position(&recipient);
                position.supply_shares = checked_add(position.supply_shares, accrual.fee_shares)?;
                self.set_position(&recipient, position);
            }

            self.events.push(LedgerEvent::InterestAccrued {
                rate: accrual.rate,
                interest: accrual.interest,
                fee_shares: accrual.fee_shares,
            });
        }
        Ok(())
    }

    /// Fail with `InsufficientLiquidity` if borrows exceed supply
    pub(crate) fn ensure_liquid(&self) -> Result<()> {
        if !self.state.is_liquid() {
            return Err(Error::InsufficientLiquidity(format!(
                "borrowed {} exceeds supplied {}",
                self.state.total_borrow_assets, self.state.total_supply_assets
            )));
        }
        Ok(())
    }

    /// Write off borrow assets left behind once the last borrow share is burned
    ///
    /// Rounding can leave a few units of debt that no position owes. They are
    /// taken from suppliers so that no shares means no debt.
    pub(crate) fn write_off_residual_debt(&mut self) {
        let residual = self.state.total_borrow_assets;
        if !self.state.total_borrow_shares.is_zero() || residual.is_zero() {
            return;
        }

        self.state.total_borrow_assets = U256::ZERO;
        self.state.total_supply_assets = zero_floor_sub(self.state.total_supply_assets, residual);
        warn!(market = %self.market.id, residual = %residual, "Residual debt written off");
    }

    /// Fail with `InsufficientCollateral` if `account` is insolvent
    pub(crate) fn ensure_solvent(&self, account: &AccountId) -> Result<()> {
        self.market.env.risk.ensure_solvent(
            &self.market.params,
            &self.state.borrow_pool(),
            &self.position(account),
            account,
        )
    }
}

impl Market {
    /// Empty market; fees go to the registry owner until changed
    pub fn new(params: MarketParams, rate_model: Arc<dyn RateModel>, env: Arc<Environment>) -> Self {
        let state = MarketState::new(env.now(), env.registry.owner());
        Self {
            id: params.id(),
            params,
            state,
            positions: HashMap::new(),
            rate_model,
            env,
        }
    }

    /// Market id
    pub fn id(&self) -> MarketId {
        self.id
    }

    /// Committed state
    pub fn snapshot(&self) -> MarketSnapshot {
        MarketSnapshot {
            id: self.id,
            params: self.params.clone(),
            state: self.state.clone(),
        }
    }

    /// Committed position of `account`
    pub fn position(&self, account: &AccountId) -> Position {
        self.positions.get(account).copied().unwrap_or_default()
    }

    /// Run `op` on a draft and commit it if it succeeds
    pub(crate) fn execute<T>(&mut self, op: impl FnOnce(&mut Draft<'_>) -> Result<T>) -> Result<T> {
        let mut draft = Draft::new(self);
        let output = op(&mut draft)?;

        let Draft {
            state,
            events,
            legs,
            now,
            touched,
            ..
        } = draft;

        settle(self.env.custody.as_ref(), &legs)?;

        self.state = state;
        self.positions.extend(touched);
        self.env.events.publish(Some(self.id), now, events);
        Ok(output)
    }

    fn ensure_authorized(&self, caller: &AccountId, on_behalf: &AccountId) -> Result<()> {
        if !self.env.authorizations.is_authorized(on_behalf, caller) {
            return Err(Error::Unauthorized(format!(
                "{} may not act for {}",
                caller, on_behalf
            )));
        }
        Ok(())
    }

    /// Supply loan assets; assets round down to shares
    pub fn supply(&mut self, caller: &AccountId, quantity: Quantity, on_behalf: &AccountId) -> Result<AssetsShares> {
        ensure_nonzero(quantity)?;

        self.execute(|d| {
            d.accrue()?;

            let pool = d.state.supply_pool();
            let (assets, shares) = match quantity {
                Quantity::Assets(assets) => (assets, pool.to_shares_down(assets)?),
                Quantity::Shares(shares) => (pool.to_assets_up(shares)?, shares),
            };
            if shares.is_zero() {
                return Err(Error::InvalidAmount(format!("{} assets mint no shares", assets)));
            }

            d.state.total_supply_assets = checked_add(d.state.total_supply_assets, assets)?;
            d.state.total_supply_shares = checked_add(d.state.total_supply_shares, shares)?;

            let mut position = d.position(on_behalf);
            position.supply_shares = checked_add(position.supply_shares, shares)?;
            d.set_position(on_behalf, position);

            d.legs.push(TransferLeg::Deposit {
                asset: d.market.params.loan_asset.clone(),
                from: caller.clone(),
                amount: assets,
            });
            d.events.push(LedgerEvent::Supplied {
                caller: caller.clone(),
                on_behalf: on_behalf.clone(),
                assets,
                shares,
            });

            debug!(market = %d.market.id, account = %on_behalf, assets = %assets, shares = %shares, "Supplied");
            Ok(AssetsShares { assets, shares })
        })
    }

    /// Withdraw loan assets; assets round up to shares
    pub fn withdraw(
        &mut self,
        caller: &AccountId,
        quantity: Quantity,
        on_behalf: &AccountId,
        receiver: &AccountId,
    ) -> Result<AssetsShares> {
        ensure_nonzero(quantity)?;
        self.ensure_authorized(caller, on_behalf)?;

        self.execute(|d| {
            d.accrue()?;

            let pool = d.state.supply_pool();
            let (assets, shares) = match quantity {
                Quantity::Assets(assets) => (assets, pool.to_shares_up(assets)?),
                Quantity::Shares(shares) => (pool.to_assets_down(shares)?, shares),
            };

            let mut position = d.position(on_behalf);
            if position.supply_shares < shares {
                return Err(Error::InsufficientBalance(format!(
                    "{} holds {} supply shares, needs {}",
                    on_behalf, position.supply_shares, shares
                )));
            }
            position.supply_shares -= shares;
            d.set_position(on_behalf, position);

            d.state.total_supply_shares = checked_sub(d.state.total_supply_shares, shares)?;
            d.state.total_supply_assets = d
                .state
                .total_supply_assets
                .checked_sub(assets)
                .ok_or_else(|| Error::InsufficientLiquidity(format!("{} exceeds supplied assets", assets)))?;
            d.ensure_liquid()?;

            d.legs.push(TransferLeg::Release {
                asset: d.market.params.loan_asset.clone(),
                to: receiver.clone(),
                amount: assets,
            });
            d.events.push(LedgerEvent::Withdrawn {
                caller: caller.clone(),
                on_behalf: on_behalf.clone(),
                receiver: receiver.clone(),
                assets,
                shares,
            });

            debug!(market = %d.market.id, account = %on_behalf, assets = %assets, shares = %shares, "Withdrawn");
            Ok(AssetsShares { assets, shares })
        })
    }

    /// Pledge collateral
    pub fn supply_collateral(&mut self, caller: &AccountId, assets: U256, on_behalf: &AccountId) -> Result<()> {
        ensure_nonzero(Quantity::Assets(assets))?;

        self.execute(|d| {
            d.accrue()?;

            let mut position = d.position(on_behalf);
            position.collateral = checked_add(position.collateral, assets)?;
            d.set_position(on_behalf, position);

            d.legs.push(TransferLeg::Deposit {
                asset: d.market.params.collateral_asset.clone(),
                from: caller.clone(),
                amount: assets,
            });
            d.events.push(LedgerEvent::CollateralSupplied {
                caller: caller.clone(),
                on_behalf: on_behalf.clone(),
                assets,
            });

            debug!(market = %d.market.id, account = %on_behalf, assets = %assets, "Collateral supplied");
            Ok(())
        })
    }

    /// Release collateral; the position must stay solvent
    pub fn withdraw_collateral(
        &mut self,
        caller: &AccountId,
        assets: U256,
        on_behalf: &AccountId,
        receiver: &AccountId,
    ) -> Result<()> {
        ensure_nonzero(Quantity::Assets(assets))?;
        self.ensure_authorized(caller, on_behalf)?;

        self.execute(|d| {
            d.accrue()?;

            let mut position = d.position(on_behalf);
            if position.collateral < assets {
                return Err(Error::InsufficientBalance(format!(
                    "{} holds {} collateral, needs {}",
                    on_behalf, position.collateral, assets
                )));
            }
            position.collateral -= assets;
            d.set_position(on_behalf, position);

            d.ensure_solvent(on_behalf)?;

            d.legs.push(TransferLeg::Release {
                asset: d.market.params.collateral_asset.clone(),
                to: receiver.clone(),
                amount: assets,
            });
            d.events.push(LedgerEvent::CollateralWithdrawn {
                caller: caller.clone(),
                on_behalf: on_behalf.clone(),
                receiver: receiver.clone(),
                assets,
            });

            debug!(market = %d.market.id, account = %on_behalf, assets = %assets, "Collateral withdrawn");
            Ok(())
        })
    }

    /// Borrow loan assets; assets round up to shares
    pub fn borrow(
        &mut self,
        caller: &AccountId,
        quantity: Quantity,
        on_behalf: &AccountId,
        receiver: &AccountId,
    ) -> Result<AssetsShares> {
        ensure_nonzero(quantity)?;
        self.ensure_authorized(caller, on_behalf)?;

        self.execute(|d| {
            d.accrue()?;

            let pool = d.state.borrow_pool();
            let (assets, shares) = match quantity {
                Quantity::Assets(assets) => (assets, pool.to_shares_up(assets)?),
                Quantity::Shares(shares) => (pool.to_assets_down(shares)?, shares),
            };
            if assets.is_zero() {
                return Err(Error::InvalidAmount(format!("{} shares borrow no assets", shares)));
            }

            d.state.total_borrow_assets = checked_add(d.state.total_borrow_assets, assets)?;
            d.state.total_borrow_shares = checked_add(d.state.total_borrow_shares, shares)?;

            let mut position = d.position(on_behalf);
            position.borrow_shares = checked_add(position.borrow_shares, shares)?;
            d.set_position(on_behalf, position);

            d.ensure_liquid()?;
            d.ensure_solvent(on_behalf)?;

            d.legs.push(TransferLeg::Release {
                asset: d.market.params.loan_asset.clone(),
                to: receiver.clone(),
                amount: assets,
            });
            d.events.push(LedgerEvent::Borrowed {
                caller: caller.clone(),
                on_behalf: on_behalf.clone(),
                receiver: receiver.clone(),
                assets,
                shares,
            });

            debug!(market = %d.market.id, account = %on_behalf, assets = %assets, shares = %shares, "Borrowed");
            Ok(AssetsShares { assets, shares })
        })
    }

    /// Repay debt; assets round down to shares
    pub fn repay(&mut self, caller: &AccountId, quantity: Quantity, on_behalf: &AccountId) -> Result<AssetsShares> {
        ensure_nonzero(quantity)?;

        self.execute(|d| {
            d.accrue()?;

            let pool = d.state.borrow_pool();
            let mut position = d.position(on_behalf);
            let (assets, shares) = match quantity {
                Quantity::Assets(assets) => {
                    // Debt is judged in assets, as the solvency view reports it
                    let owed = pool.to_assets_up(position.borrow_shares)?;
                    if assets > owed {
                        return Err(Error::ExceedsDebt(format!(
                            "{} owes {} assets, repaying {}",
                            on_behalf, owed, assets
                        )));
                    }
                    (assets, pool.to_shares_down(assets)?.min(position.borrow_shares))
                }
                Quantity::Shares(shares) => {
                    if shares > position.borrow_shares {
                        return Err(Error::ExceedsDebt(format!(
                            "{} owes {} borrow shares, repaying {}",
                            on_behalf, position.borrow_shares, shares
                        )));
                    }
                    (pool.to_assets_up(shares)?, shares)
                }
            };
            if shares.is_zero() {
                return Err(Error::InvalidAmount(format!("{} assets burn no shares", assets)));
            }

            position.borrow_shares -= shares;
            d.set_position(on_behalf, position);

            d.state.total_borrow_shares = checked_sub(d.state.total_borrow_shares, shares)?;
            d.state.total_borrow_assets = zero_floor_sub(d.state.total_borrow_assets, assets);
            d.write_off_residual_debt();

            d.legs.push(TransferLeg::Deposit {
                asset: d.market.params.loan_asset.clone(),
                from: caller.clone(),
                amount: assets,
            });
            d.events.push(LedgerEvent::Repaid {
                caller: caller.clone(),
                on_behalf: on_behalf.clone(),
                assets,
                shares,
            });

            debug!(market = %d.market.id, account = %on_behalf, assets = %assets, shares = %shares, "Repaid");
            Ok(AssetsShares { assets, shares })
        })
    }

    /// Accrue interest up to now
    pub fn accrue_interest(&mut self) -> Result<()> {
        self.execute(|d| d.accrue())
    }

    /// Change the protocol fee; interest up to now accrues at the old fee
    pub fn set_fee(&mut self, caller: &AccountId, fee: U256) -> Result<()> {
        self.env.registry.ensure_owner(caller)?;
        if fee > self.env.max_fee {
            return Err(Error::InvalidFee(format!("fee {} above maximum {}", fee, self.env.max_fee)));
        }

        self.execute(|d| {
            d.accrue()?;
            d.state.fee = fee;
            d.events.push(LedgerEvent::FeeSet { fee });
            Ok(())
        })
    }

    /// Change the fee recipient; interest up to now accrues to the old one
    pub fn set_fee_recipient(&mut self, caller: &AccountId, recipient: AccountId) -> Result<()> {
        self.env.registry.ensure_owner(caller)?;

        self.execute(|d| {
            d.accrue()?;
            d.state.fee_recipient = recipient.clone();
            d.events.push(LedgerEvent::FeeRecipientSet { recipient });
            Ok(())
        })
    }

    /// Solvency of `account` with interest accrued to now; commits nothing
    pub fn solvency(&self, account: &AccountId) -> Result<SolvencyReport> {
        let mut draft = Draft::new(self);
        draft.accrue()?;
        self.env.risk.assess(
            &self.params,
            &draft.state.borrow_pool(),
            &draft.position(account),
            account,
        )
    }
}

fn ensure_nonzero(quantity: Quantity) -> Result<()> {
    if quantity.is_zero() {
        return Err(Error::InvalidAmount("amount must be nonzero".to_string()));
    }
    Ok(())
}
