//! Risk parameter registry
//!
//! Allow-lists of rate models and base thresholds that new markets may use.
//! Both lists are append-only.

use crate::external::RateModel;
use crate::types::{AccountId, MarketParams, RateModelId};
use crate::{Error, Result};
use alloy_primitives::U256;
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

/// Registry of enabled market parameters
#[derive(Debug)]
pub struct Registry {
    owner: RwLock<AccountId>,
    rate_models: DashMap<RateModelId, Arc<dyn RateModel>>,
    thresholds: DashSet<U256>,
}

impl Registry {
    /// Create a registry administered by `owner`
    pub fn new(owner: AccountId) -> Self {
        Self {
            owner: RwLock::new(owner),
            rate_models: DashMap::new(),
            thresholds: DashSet::new(),
        }
    }

    /// Current owner
    pub fn owner(&self) -> AccountId {
        self.owner.read().clone()
    }

    /// Fail with `Unauthorized` unless `caller` is the owner
    pub fn ensure_owner(&self, caller: &AccountId) -> Result<()> {
        if *self.owner.read() != *caller {
            return Err(Error::Unauthorized(format!("{} is not the registry owner", caller)));
        }
        Ok(())
    }

    /// Transfer ownership
    pub fn set_owner(&self, caller: &AccountId, new_owner: AccountId) -> Result<()> {
        let mut owner = self.owner.write();
        if *owner != *caller {
            return Err(Error::Unauthorized(format!("{} is not the registry owner", caller)));
        }
        info!(from = %owner, to = %new_owner, "Registry owner changed");
        *owner = new_owner;
        Ok(())
    }

    /// Allow `model` under `id`; returns whether it was newly enabled
    ///
    /// Enabling an id twice keeps the first model.
    pub fn enable_rate_model(&self, caller: &AccountId, id: RateModelId, model: Arc<dyn RateModel>) -> Result<bool> {
        self.ensure_owner(caller)?;

        let mut inserted = false;
        self.rate_models.entry(id.clone()).or_insert_with(|| {
            inserted = true;
            model
        });

        if inserted {
            info!(rate_model = %id, "Rate model enabled");
        }
        Ok(inserted)
    }

    /// Allow a base threshold below 1.0; returns whether it was newly enabled
    pub fn enable_base_threshold(&self, caller: &AccountId, threshold: U256) -> Result<bool> {
        self.ensure_owner(caller)?;
        risk_engine::threshold::validate_base_threshold(threshold)?;

        let inserted = self.thresholds.insert(threshold);
        if inserted {
            info!(threshold = %threshold, "Base threshold enabled");
        }
        Ok(inserted)
    }

    /// Whether a rate model is enabled
    pub fn is_rate_model_enabled(&self, id: &RateModelId) -> bool {
        self.rate_models.contains_key(id)
    }

    /// Whether a base threshold is enabled
    pub fn is_threshold_enabled(&self, threshold: &U256) -> bool {
        self.thresholds.contains(threshold)
    }

    /// Check `params` against the allow-lists and resolve its rate model
    pub fn admit(&self, params: &MarketParams) -> Result<Arc<dyn RateModel>> {
        let model = self
            .rate_models
            .get(&params.rate_model)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::UnknownRateModel(params.rate_model.to_string()))?;

        if !self.is_threshold_enabled(&params.base_threshold) {
            return Err(Error::UnknownThreshold(params.base_threshold.to_string()));
        }

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::FixedRate;
    use crate::types::{AssetId, OracleId};
    use risk_engine::WAD;

    fn owner() -> AccountId {
        AccountId::new("owner")
    }

    fn threshold() -> U256 {
        U256::from(945_000_000_000_000_000u64)
    }

    fn params() -> MarketParams {
        MarketParams {
            loan_asset: AssetId::new("USDC"),
            collateral_asset: AssetId::new("WETH"),
            oracle: OracleId::new("weth-usdc"),
            rate_model: RateModelId::new("fixed"),
            base_threshold: threshold(),
        }
    }

    fn model() -> Arc<dyn RateModel> {
        Arc::new(FixedRate::per_second(U256::ZERO))
    }

    #[test]
    fn test_only_owner_enables() {
        let registry = Registry::new(owner());
        let stranger = AccountId::new("stranger");

        assert!(matches!(
            registry.enable_rate_model(&stranger, RateModelId::new("fixed"), model()),
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            registry.enable_base_threshold(&stranger, threshold()),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_enable_is_idempotent() {
        let registry = Registry::new(owner());
        assert!(registry.enable_rate_model(&owner(), RateModelId::new("fixed"), model()).unwrap());
        assert!(!registry.enable_rate_model(&owner(), RateModelId::new("fixed"), model()).unwrap());
        assert!(registry.enable_base_threshold(&owner(), threshold()).unwrap());
        assert!(!registry.enable_base_threshold(&owner(), threshold()).unwrap());

        assert!(registry.is_rate_model_enabled(&RateModelId::new("fixed")));
        assert!(!registry.is_rate_model_enabled(&RateModelId::new("kinked")));
        assert!(registry.is_threshold_enabled(&threshold()));
        assert!(!registry.is_threshold_enabled(&WAD));
    }

    #[test]
    fn test_threshold_must_be_below_one() {
        let registry = Registry::new(owner());
        assert!(matches!(
            registry.enable_base_threshold(&owner(), WAD),
            Err(Error::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_admit_checks_allow_lists() {
        let registry = Registry::new(owner());
        assert!(matches!(registry.admit(&params()), Err(Error::UnknownRateModel(_))));

        registry.enable_rate_model(&owner(), RateModelId::new("fixed"), model()).unwrap();
        assert!(matches!(registry.admit(&params()), Err(Error::UnknownThreshold(_))));

        registry.enable_base_threshold(&owner(), threshold()).unwrap();
        assert!(registry.admit(&params()).is_ok());
    }

    #[test]
    fn test_set_owner() {
        let registry = Registry::new(owner());
        let next = AccountId::new("next");
        registry.set_owner(&owner(), next.clone()).unwrap();
        assert_eq!(registry.owner(), next);
        assert!(registry.ensure_owner(&owner()).is_err());
    }
}
