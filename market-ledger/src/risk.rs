//! Borrower risk: effective thresholds and solvency
//!
//! The effective threshold of a borrower is the market's base threshold,
//! raised by a per-market credit-tier override when the borrower's attested
//! tier has one. Attestation failures degrade to "ungraded"; oracle failures
//! are fatal.
//!
//! Every check here is pure with respect to ledger state.

use crate::external::{CreditAttestation, OracleDirectory};
use crate::types::{AccountId, MarketId, MarketParams, Position};
use crate::{Error, Result};
use alloy_primitives::U256;
use dashmap::DashMap;
use risk_engine::threshold::{resolve, validate_override};
use risk_engine::{assess, CreditTier, Pool, SolvencyReport, TierLabel};
use std::sync::Arc;
use tracing::{debug, warn};

/// Composite key of a credit-tier override
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TierKey {
    /// Market
    pub market: MarketId,
    /// Tier
    pub tier: TierLabel,
}

/// Threshold resolution and solvency checks
#[derive(Debug)]
pub struct RiskEngine {
    overrides: DashMap<TierKey, U256>,
    attestation: Arc<dyn CreditAttestation>,
    oracles: Arc<OracleDirectory>,
    principal: AccountId,
}

impl RiskEngine {
    /// `principal` is the identity the ledger reads credit tiers as
    pub fn new(attestation: Arc<dyn CreditAttestation>, oracles: Arc<OracleDirectory>, principal: AccountId) -> Self {
        Self {
            overrides: DashMap::new(),
            attestation,
            oracles,
            principal,
        }
    }

    /// Identity used for attestation lookups
    pub fn principal(&self) -> &AccountId {
        &self.principal
    }

    /// Set the override of `tier` in the market of `params`
    ///
    /// The override must exceed the base threshold; it may exceed 1.0.
    pub fn set_tier_threshold(&self, params: &MarketParams, tier: TierLabel, threshold: U256) -> Result<()> {
        validate_override(params.base_threshold, threshold)?;
        self.overrides.insert(
            TierKey {
                market: params.id(),
                tier,
            },
            threshold,
        );
        Ok(())
    }

    /// Remove an override; returns whether one existed
    pub fn clear_tier_threshold(&self, market: &MarketId, tier: &TierLabel) -> bool {
        self.overrides
            .remove(&TierKey {
                market: *market,
                tier: tier.clone(),
            })
            .is_some()
    }

    /// Override of `tier` in `market`, if any
    pub fn tier_threshold(&self, market: &MarketId, tier: &TierLabel) -> Option<U256> {
        self.overrides
            .get(&TierKey {
                market: *market,
                tier: tier.clone(),
            })
            .map(|entry| *entry.value())
    }

    /// Credit tier of `account`, "ungraded" on any attestation failure
    pub fn tier_of(&self, account: &AccountId) -> CreditTier {
        match self.attestation.tier_of(account, &self.principal) {
            Ok(tier) => tier,
            Err(err) => {
                warn!(account = %account, error = %err, "Credit tier unavailable, treating as ungraded");
                CreditTier::Ungraded
            }
        }
    }

    /// Threshold that applies to `account` in the market of `params`
    pub fn effective_threshold(&self, params: &MarketParams, account: &AccountId) -> U256 {
        let tier_override = match self.tier_of(account) {
            CreditTier::Graded(label) => self.tier_threshold(&params.id(), &label),
            CreditTier::Ungraded => None,
        };
        resolve(params.base_threshold, tier_override)
    }

    /// Current oracle price of the market's collateral
    pub fn price(&self, params: &MarketParams) -> Result<U256> {
        Ok(self.oracles.price(&params.oracle, &params.id())?)
    }

    /// Full solvency report; always reads the oracle
    pub fn assess(
        &self,
        params: &MarketParams,
        borrow_pool: &Pool,
        position: &Position,
        account: &AccountId,
    ) -> Result<SolvencyReport> {
        let threshold = self.effective_threshold(params, account);
        let price = self.price(params)?;
        Ok(assess(position.exposure(), borrow_pool, price, threshold)?)
    }

    /// Fail with `InsufficientCollateral` unless the position is solvent
    ///
    /// A debt-free position is solvent at any price; the oracle is not read.
    pub fn ensure_solvent(
        &self,
        params: &MarketParams,
        borrow_pool: &Pool,
        position: &Position,
        account: &AccountId,
    ) -> Result<()> {
        if position.borrow_shares.is_zero() {
            return Ok(());
        }

        let report = self.assess(params, borrow_pool, position, account)?;
        debug!(
            account = %account,
            borrowed = %report.borrowed,
            max_borrow = %report.max_borrow,
            threshold = %report.threshold,
            "Solvency checked"
        );

        if !report.healthy {
            return Err(Error::InsufficientCollateral(format!(
                "{} owes {} against borrowing power {}",
                account, report.borrowed, report.max_borrow
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{ManualClock, StaticOracle, InMemoryAttestation};
    use crate::types::{AssetId, OracleId, RateModelId};
    use risk_engine::{ORACLE_PRICE_SCALE, WAD};

    fn milli(n: u64) -> U256 {
        U256::from(n) * U256::from(1_000_000_000_000_000u64)
    }

    fn params() -> MarketParams {
        MarketParams {
            loan_asset: AssetId::new("USDC"),
            collateral_asset: AssetId::new("WETH"),
            oracle: OracleId::new("weth-usdc"),
            rate_model: RateModelId::new("fixed"),
            base_threshold: milli(945),
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        attestation: Arc<InMemoryAttestation>,
        oracle: Arc<StaticOracle>,
        risk: RiskEngine,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(1_000));
        let attestation = Arc::new(InMemoryAttestation::new(clock.clone()));
        let oracles = Arc::new(OracleDirectory::new());
        let oracle = Arc::new(StaticOracle::new("weth-usdc", ORACLE_PRICE_SCALE, clock.clone()));
        oracles.register(OracleId::new("weth-usdc"), oracle.clone());
        let risk = RiskEngine::new(attestation.clone(), oracles, AccountId::new("market"));
        Fixture {
            clock,
            attestation,
            oracle,
            risk,
        }
    }

    /// Borrow `assets` from an empty pool
    fn borrowed(assets: U256, collateral: U256) -> (Pool, Position) {
        let shares = Pool::default().to_shares_up(assets).unwrap();
        (
            Pool::new(assets, shares),
            Position {
                supply_shares: U256::ZERO,
                borrow_shares: shares,
                collateral,
            },
        )
    }

    #[test]
    fn test_override_must_exceed_base() {
        let f = fixture();
        let tier = TierLabel::new("AAA+").unwrap();
        assert!(matches!(
            f.risk.set_tier_threshold(&params(), tier.clone(), milli(900)),
            Err(Error::InvalidThreshold(_))
        ));
        f.risk.set_tier_threshold(&params(), tier.clone(), milli(1_250)).unwrap();
        assert_eq!(f.risk.tier_threshold(&params().id(), &tier), Some(milli(1_250)));
        assert!(f.risk.clear_tier_threshold(&params().id(), &tier));
        assert_eq!(f.risk.tier_threshold(&params().id(), &tier), None);
    }

    #[test]
    fn test_effective_threshold_needs_grant() {
        let f = fixture();
        let alice = AccountId::new("alice");
        let tier = TierLabel::new("AAA+").unwrap();
        f.risk.set_tier_threshold(&params(), tier.clone(), milli(1_250)).unwrap();
        f.attestation.set_tier(alice.clone(), tier);

        // No grant: base threshold
        assert_eq!(f.risk.effective_threshold(&params(), &alice), milli(945));

        f.attestation.grant(alice.clone(), AccountId::new("market"), 60);
        assert_eq!(f.risk.effective_threshold(&params(), &alice), milli(1_250));

        // Grant lapses: back to base
        f.clock.advance(60);
        assert_eq!(f.risk.effective_threshold(&params(), &alice), milli(945));
    }

    #[test]
    fn test_tier_without_override_uses_base() {
        let f = fixture();
        let bob = AccountId::new("bob");
        f.attestation.set_tier(bob.clone(), TierLabel::new("BBB-").unwrap());
        f.attestation.grant(bob.clone(), AccountId::new("market"), 60);
        assert_eq!(f.risk.effective_threshold(&params(), &bob), milli(945));
    }

    #[test]
    fn test_ensure_solvent() {
        let f = fixture();
        let alice = AccountId::new("alice");

        let (pool, position) = borrowed(milli(94_500), U256::from(100u8) * WAD);
        assert!(f.risk.ensure_solvent(&params(), &pool, &position, &alice).is_ok());

        let (pool, position) = borrowed(milli(94_510), U256::from(100u8) * WAD);
        assert!(matches!(
            f.risk.ensure_solvent(&params(), &pool, &position, &alice),
            Err(Error::InsufficientCollateral(_))
        ));
    }

    #[test]
    fn test_oracle_failure_is_fatal() {
        let f = fixture();
        let (pool, position) = borrowed(milli(1_000), U256::from(100u8) * WAD);
        f.oracle.set_price(U256::ZERO);
        assert!(matches!(
            f.risk.ensure_solvent(&params(), &pool, &position, &AccountId::new("alice")),
            Err(Error::Oracle(_))
        ));
    }

    #[test]
    fn test_debt_free_skips_oracle() {
        let f = fixture();
        f.oracle.clear();
        let position = Position {
            collateral: WAD,
            ..Position::default()
        };
        assert!(f
            .risk
            .ensure_solvent(&params(), &Pool::default(), &position, &AccountId::new("alice"))
            .is_ok());
    }
}
