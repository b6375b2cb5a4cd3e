//! Main ledger orchestration layer
//!
//! This module ties together the registry, the per-market actors and the
//! shared risk services into a high-level async API.
//!
//! # Example
//!
//! ```no_run
//! use market_ledger::external::{InMemoryAttestation, InMemoryCustody, SystemClock};
//! use market_ledger::{Collaborators, Config, Ledger};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> market_ledger::Result<()> {
//!     let clock = Arc::new(SystemClock);
//!     let collaborators = Collaborators {
//!         attestation: Arc::new(InMemoryAttestation::new(clock.clone())),
//!         custody: Arc::new(InMemoryCustody::new()),
//!         clock,
//!     };
//!     let config = Config::default();
//!     let ledger = Ledger::open(config.clone(), collaborators).await?;
//!     ledger.bootstrap(&config.bootstrap).await?;
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::actor::{spawn_market_actor, MarketCommand, MarketHandle};
use crate::config::BootstrapConfig;
use crate::context::{Collaborators, Environment};
use crate::events::{EventEnvelope, LedgerEvent};
use crate::external::{PriceOracle, RateModel, StaticOracle};
use crate::liquidation::LiquidationOutcome;
use crate::market::{Market, MarketSnapshot};
use crate::metrics::Metrics;
use crate::types::{AccountId, AssetsShares, MarketId, MarketParams, OracleId, Position, Quantity, RateModelId};
use crate::{Config, Error, Result};
use alloy_primitives::U256;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use risk_engine::math::{price_from_decimal, wad_from_decimal};
use risk_engine::{SolvencyReport, TierLabel};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Shared services
    env: Arc<Environment>,

    /// Actor handle of every market
    markets: DashMap<MarketId, MarketHandle>,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    pub async fn open(config: Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let incentive = config.liquidation.build()?;
        let max_fee = wad_from_decimal(config.max_fee)?;
        let env = Environment::new(
            config.owner.clone(),
            config.principal.clone(),
            collaborators,
            incentive,
            max_fee,
            config.event_buffer,
        )?;

        info!(
            service = %config.service_name,
            owner = %config.owner,
            principal = %config.principal,
            "Ledger opened"
        );

        Ok(Self {
            env: Arc::new(env),
            markets: DashMap::new(),
            config,
        })
    }

    /// Shared services
    pub fn environment(&self) -> &Arc<Environment> {
        &self.env
    }

    /// Prometheus collectors
    pub fn metrics(&self) -> &Metrics {
        &self.env.metrics
    }

    /// Subscribe to committed events
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.env.events.subscribe()
    }

    fn publish(&self, market: Option<MarketId>, event: LedgerEvent) {
        self.env.events.publish(market, self.env.now(), [event]);
    }

    fn handle(&self, market: &MarketId) -> Result<MarketHandle> {
        self.markets
            .get(market)
            .map(|entry| entry.value().clone())
            .ok_or(Error::MarketNotFound(*market))
    }

    // Registry

    /// Current registry owner
    pub fn owner(&self) -> AccountId {
        self.env.registry.owner()
    }

    /// Transfer registry ownership
    pub fn set_owner(&self, caller: &AccountId, new_owner: AccountId) -> Result<()> {
        self.env.registry.set_owner(caller, new_owner.clone())?;
        self.publish(None, LedgerEvent::OwnerSet { owner: new_owner });
        Ok(())
    }

    /// Allow a rate model; returns whether it was newly enabled
    pub fn enable_rate_model(&self, caller: &AccountId, id: RateModelId, model: Arc<dyn RateModel>) -> Result<bool> {
        let enabled = self.env.registry.enable_rate_model(caller, id.clone(), model)?;
        if enabled {
            self.publish(None, LedgerEvent::RateModelEnabled { rate_model: id });
        }
        Ok(enabled)
    }

    /// Allow a base threshold; returns whether it was newly enabled
    pub fn enable_base_threshold(&self, caller: &AccountId, threshold: U256) -> Result<bool> {
        let enabled = self.env.registry.enable_base_threshold(caller, threshold)?;
        if enabled {
            self.publish(None, LedgerEvent::ThresholdEnabled { threshold });
        }
        Ok(enabled)
    }

    /// Let `authorized` act on `authorizer`'s positions, or stop it
    pub fn set_authorization(&self, authorizer: &AccountId, authorized: &AccountId, granted: bool) {
        self.env
            .authorizations
            .set(authorizer.clone(), authorized.clone(), granted);
        info!(authorizer = %authorizer, authorized = %authorized, granted, "Authorization set");
        self.publish(
            None,
            LedgerEvent::AuthorizationSet {
                authorizer: authorizer.clone(),
                authorized: authorized.clone(),
                granted,
            },
        );
    }

    /// Make a price source available under `id`
    pub fn register_oracle(&self, id: OracleId, oracle: Arc<dyn PriceOracle>) {
        info!(oracle = %id, "Oracle registered");
        self.env.oracles.register(id, oracle);
    }

    /// Create a market; anyone may create one from allow-listed parameters
    pub async fn create_market(&self, params: MarketParams) -> Result<MarketId> {
        let rate_model = self.env.registry.admit(&params)?;
        let id = params.id();

        match self.markets.entry(id) {
            Entry::Occupied(_) => return Err(Error::MarketAlreadyExists(id)),
            Entry::Vacant(entry) => {
                let market = Market::new(params.clone(), rate_model, Arc::clone(&self.env));
                entry.insert(spawn_market_actor(market, self.config.mailbox_capacity));
            }
        }

        self.env.metrics.record_market_created();
        info!(
            market = %id,
            loan = %params.loan_asset,
            collateral = %params.collateral_asset,
            base_threshold = %params.base_threshold,
            "Market created"
        );
        self.publish(Some(id), LedgerEvent::MarketCreated { params });
        Ok(id)
    }

    /// Ids of all markets
    pub fn market_ids(&self) -> Vec<MarketId> {
        self.markets.iter().map(|entry| *entry.key()).collect()
    }

    /// Immutable parameters of `market`
    pub fn market_params(&self, market: &MarketId) -> Result<MarketParams> {
        Ok(self.handle(market)?.params().clone())
    }

    // Credit tiers

    /// Set the threshold of `tier` in `market`; owner only
    pub fn set_tier_threshold(&self, caller: &AccountId, market: &MarketId, tier: TierLabel, threshold: U256) -> Result<()> {
        self.env.registry.ensure_owner(caller)?;
        let handle = self.handle(market)?;

        self.env
            .risk
            .set_tier_threshold(handle.params(), tier.clone(), threshold)?;

        info!(market = %market, tier = %tier, threshold = %threshold, "Tier threshold set");
        self.publish(
            Some(*market),
            LedgerEvent::TierThresholdSet {
                tier,
                threshold: Some(threshold),
            },
        );
        Ok(())
    }

    /// Remove the override of `tier` in `market`; owner only
    pub fn clear_tier_threshold(&self, caller: &AccountId, market: &MarketId, tier: TierLabel) -> Result<bool> {
        self.env.registry.ensure_owner(caller)?;
        self.handle(market)?;

        let cleared = self.env.risk.clear_tier_threshold(market, &tier);
        if cleared {
            info!(market = %market, tier = %tier, "Tier threshold cleared");
            self.publish(Some(*market), LedgerEvent::TierThresholdSet { tier, threshold: None });
        }
        Ok(cleared)
    }

    /// Threshold that applies to `account` in `market`
    pub fn effective_threshold(&self, market: &MarketId, account: &AccountId) -> Result<U256> {
        let handle = self.handle(market)?;
        Ok(self.env.risk.effective_threshold(handle.params(), account))
    }

    // Market operations

    /// Supply loan assets to `on_behalf`'s position
    pub async fn supply(
        &self,
        market: &MarketId,
        caller: &AccountId,
        quantity: Quantity,
        on_behalf: &AccountId,
    ) -> Result<AssetsShares> {
        self.handle(market)?
            .execute(MarketCommand::Supply {
                caller: caller.clone(),
                quantity,
                on_behalf: on_behalf.clone(),
            })
            .await?
            .into_moved()
    }

    /// Withdraw loan assets from `on_behalf`'s position to `receiver`
    pub async fn withdraw(
        &self,
        market: &MarketId,
        caller: &AccountId,
        quantity: Quantity,
        on_behalf: &AccountId,
        receiver: &AccountId,
    ) -> Result<AssetsShares> {
        self.handle(market)?
            .execute(MarketCommand::Withdraw {
                caller: caller.clone(),
                quantity,
                on_behalf: on_behalf.clone(),
                receiver: receiver.clone(),
            })
            .await?
            .into_moved()
    }

    /// Pledge collateral to `on_behalf`'s position
    pub async fn supply_collateral(
        &self,
        market: &MarketId,
        caller: &AccountId,
        assets: U256,
        on_behalf: &AccountId,
    ) -> Result<()> {
        self.handle(market)?
            .execute(MarketCommand::SupplyCollateral {
                caller: caller.clone(),
                assets,
                on_behalf: on_behalf.clone(),
            })
            .await?
            .into_done()
    }

    /// Release collateral from `on_behalf`'s position to `receiver`
    pub async fn withdraw_collateral(
        &self,
        market: &MarketId,
        caller: &AccountId,
        assets: U256,
        on_behalf: &AccountId,
        receiver: &AccountId,
    ) -> Result<()> {
        self.handle(market)?
            .execute(MarketCommand::WithdrawCollateral {
                caller: caller.clone(),
                assets,
                on_behalf: on_behalf.clone(),
                receiver: receiver.clone(),
            })
            .await?
            .into_done()
    }

    /// Borrow against `on_behalf`'s collateral, paying `receiver`
    pub async fn borrow(
        &self,
        market: &MarketId,
        caller: &AccountId,
        quantity: Quantity,
        on_behalf: &AccountId,
        receiver: &AccountId,
    ) -> Result<AssetsShares> {
        self.handle(market)?
            .execute(MarketCommand::Borrow {
                caller: caller.clone(),
                quantity,
                on_behalf: on_behalf.clone(),
                receiver: receiver.clone(),
            })
            .await?
            .into_moved()
    }

    /// Repay `on_behalf`'s debt
    pub async fn repay(
        &self,
        market: &MarketId,
        caller: &AccountId,
        quantity: Quantity,
        on_behalf: &AccountId,
    ) -> Result<AssetsShares> {
        self.handle(market)?
            .execute(MarketCommand::Repay {
                caller: caller.clone(),
                quantity,
                on_behalf: on_behalf.clone(),
            })
            .await?
            .into_moved()
    }

    /// Liquidate `borrower`; exactly one amount must be nonzero
    pub async fn liquidate(
        &self,
        market: &MarketId,
        liquidator: &AccountId,
        borrower: &AccountId,
        seized_assets: U256,
        repaid_assets: U256,
    ) -> Result<LiquidationOutcome> {
        self.handle(market)?
            .execute(MarketCommand::Liquidate {
                liquidator: liquidator.clone(),
                borrower: borrower.clone(),
                seized_assets,
                repaid_assets,
            })
            .await?
            .into_liquidated()
    }

    /// Accrue interest of `market` to now
    pub async fn accrue_interest(&self, market: &MarketId) -> Result<()> {
        self.handle(market)?
            .execute(MarketCommand::AccrueInterest)
            .await?
            .into_done()
    }

    /// Change the protocol fee of `market`; owner only
    pub async fn set_fee(&self, caller: &AccountId, market: &MarketId, fee: U256) -> Result<()> {
        self.handle(market)?
            .execute(MarketCommand::SetFee {
                caller: caller.clone(),
                fee,
            })
            .await?
            .into_done()
    }

    /// Change the fee recipient of `market`; owner only
    pub async fn set_fee_recipient(&self, caller: &AccountId, market: &MarketId, recipient: AccountId) -> Result<()> {
        self.handle(market)?
            .execute(MarketCommand::SetFeeRecipient {
                caller: caller.clone(),
                recipient,
            })
            .await?
            .into_done()
    }

    // Views

    /// Committed totals of `market`
    pub async fn snapshot(&self, market: &MarketId) -> Result<MarketSnapshot> {
        self.handle(market)?.snapshot().await
    }

    /// Committed position of `account` in `market`
    pub async fn position(&self, market: &MarketId, account: &AccountId) -> Result<Position> {
        self.handle(market)?
            .execute(MarketCommand::Position {
                account: account.clone(),
            })
            .await?
            .into_position()
    }

    /// Solvency of `account` with interest accrued to now
    pub async fn solvency(&self, market: &MarketId, account: &AccountId) -> Result<SolvencyReport> {
        self.handle(market)?
            .execute(MarketCommand::Solvency {
                account: account.clone(),
            })
            .await?
            .into_solvency()
    }

    // Lifecycle

    /// Apply the startup section as the registry owner
    pub async fn bootstrap(&self, bootstrap: &BootstrapConfig) -> Result<Vec<MarketId>> {
        let owner = self.owner();

        for threshold in &bootstrap.thresholds {
            self.enable_base_threshold(&owner, wad_from_decimal(*threshold)?)?;
        }
        for (id, model) in &bootstrap.rate_models {
            self.enable_rate_model(&owner, RateModelId::new(id.clone()), model.build()?)?;
        }
        for (id, price) in &bootstrap.oracles {
            let oracle = StaticOracle::new(id.clone(), price_from_decimal(*price)?, Arc::clone(&self.env.clock));
            self.register_oracle(OracleId::new(id.clone()), Arc::new(oracle));
        }

        let mut created = Vec::with_capacity(bootstrap.markets.len());
        for market in &bootstrap.markets {
            created.push(self.create_market(market.params()?).await?);
        }
        Ok(created)
    }

    /// Stop every market actor
    pub async fn shutdown(&self) -> Result<()> {
        let handles: Vec<MarketHandle> = self.markets.iter().map(|entry| entry.value().clone()).collect();
        for handle in handles {
            handle.shutdown().await?;
        }
        info!(markets = self.markets.len(), "Ledger shut down");
        Ok(())
    }
}
