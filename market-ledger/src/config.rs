//! Configuration for the ledger

use crate::external::RateModelConfig;
use crate::types::{AccountId, AssetId, MarketParams, OracleId, RateModelId};
use crate::{Error, Result};
use risk_engine::math::wad_from_decimal;
use risk_engine::IncentiveConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Registry owner
    pub owner: AccountId,

    /// Identity the ledger reads credit tiers as
    pub principal: AccountId,

    /// Bounded mailbox size of each market actor
    pub mailbox_capacity: usize,

    /// Undelivered events kept per subscriber
    pub event_buffer: usize,

    /// Highest protocol fee, e.g. `0.25`
    pub max_fee: Decimal,

    /// Liquidation incentive curve
    pub liquidation: IncentiveConfig,

    /// Allow-lists, oracles and markets applied at startup
    pub bootstrap: BootstrapConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "market-ledger".to_string(),
            owner: AccountId::new("owner"),
            principal: AccountId::new("market-ledger"),
            mailbox_capacity: 1024,
            event_buffer: 4096,
            max_fee: Decimal::new(25, 2),
            liquidation: IncentiveConfig::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

/// Startup state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Base thresholds to allow, e.g. `"0.945"`
    pub thresholds: Vec<Decimal>,

    /// Rate models to allow, by reference id
    pub rate_models: BTreeMap<String, RateModelConfig>,

    /// Fixed-price oracles, by reference id (loan units per collateral unit)
    pub oracles: BTreeMap<String, Decimal>,

    /// Markets to create
    pub markets: Vec<MarketConfig>,
}

/// One market to create at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Borrowed asset
    pub loan_asset: String,
    /// Pledged asset
    pub collateral_asset: String,
    /// Oracle reference id
    pub oracle: String,
    /// Rate model reference id
    pub rate_model: String,
    /// Base threshold, e.g. `"0.945"`
    pub base_threshold: Decimal,
}

impl MarketConfig {
    /// Market parameters
    pub fn params(&self) -> Result<MarketParams> {
        Ok(MarketParams {
            loan_asset: AssetId::new(self.loan_asset.clone()),
            collateral_asset: AssetId::new(self.collateral_asset.clone()),
            oracle: OracleId::new(self.oracle.clone()),
            rate_model: RateModelId::new(self.rate_model.clone()),
            base_threshold: wad_from_decimal(self.base_threshold)?,
        })
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(owner) = std::env::var("MARKET_LEDGER_OWNER") {
            config.owner = AccountId::new(owner);
        }

        if let Ok(principal) = std::env::var("MARKET_LEDGER_PRINCIPAL") {
            config.principal = AccountId::new(principal);
        }

        if let Ok(capacity) = std::env::var("MARKET_LEDGER_MAILBOX") {
            config.mailbox_capacity = capacity
                .parse()
                .map_err(|e| Error::Config(format!("Invalid MARKET_LEDGER_MAILBOX: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.mailbox_capacity == 0 {
            return Err(Error::Config("mailbox_capacity must be positive".to_string()));
        }
        if self.event_buffer == 0 {
            return Err(Error::Config("event_buffer must be positive".to_string()));
        }
        if self.max_fee.is_sign_negative() || self.max_fee >= Decimal::ONE {
            return Err(Error::Config(format!("max_fee {} outside [0, 1)", self.max_fee)));
        }
        self.liquidation.build()?;

        let bootstrap = &self.bootstrap;
        for threshold in &bootstrap.thresholds {
            if threshold.is_sign_negative() || *threshold >= Decimal::ONE {
                return Err(Error::Config(format!("base threshold {} outside [0, 1)", threshold)));
            }
        }
        for (id, price) in &bootstrap.oracles {
            if *price <= Decimal::ZERO {
                return Err(Error::Config(format!("oracle {} has non-positive price {}", id, price)));
            }
        }
        for market in &bootstrap.markets {
            if !bootstrap.rate_models.contains_key(&market.rate_model) {
                return Err(Error::Config(format!(
                    "market {}/{} uses undeclared rate model {}",
                    market.collateral_asset, market.loan_asset, market.rate_model
                )));
            }
            if !bootstrap.oracles.contains_key(&market.oracle) {
                return Err(Error::Config(format!(
                    "market {}/{} uses undeclared oracle {}",
                    market.collateral_asset, market.loan_asset, market.oracle
                )));
            }
            if !bootstrap.thresholds.contains(&market.base_threshold) {
                return Err(Error::Config(format!(
                    "market {}/{} uses undeclared threshold {}",
                    market.collateral_asset, market.loan_asset, market.base_threshold
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::str::FromStr;

    const SAMPLE: &str = r#"
service_name = "market-node"
owner = "risk-council"
max_fee = "0.2"

[liquidation]
curve = "health_scaled"
min_bonus = "0.02"
max_bonus = "0.1"
steepness = "4"

[bootstrap]
thresholds = ["0.945"]

[bootstrap.rate_models.kinked]
kind = "kinked"
base = "0.02"
slope1 = "0.04"
slope2 = "0.75"
kink = "0.8"

[bootstrap.oracles]
weth-usdc = "1"

[[bootstrap.markets]]
loan_asset = "USDC"
collateral_asset = "WETH"
oracle = "weth-usdc"
rate_model = "kinked"
base_threshold = "0.945"
"#;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "market-ledger");
        assert_eq!(config.max_fee, Decimal::from_str("0.25").unwrap());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.owner, AccountId::new("risk-council"));
        // Unset fields keep their defaults
        assert_eq!(config.mailbox_capacity, 1024);
        assert_eq!(config.bootstrap.markets.len(), 1);
        assert!(matches!(config.liquidation, IncentiveConfig::HealthScaled { .. }));

        let params = config.bootstrap.markets[0].params().unwrap();
        let milli = alloy_primitives::U256::from(1_000_000_000_000_000u64);
        assert_eq!(params.base_threshold, milli * alloy_primitives::U256::from(945u64));
    }

    #[test]
    fn test_undeclared_references_rejected() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config.bootstrap.markets[0].oracle = "missing".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config.bootstrap.markets[0].base_threshold = Decimal::from_str("0.9").unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.mailbox_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.max_fee = Decimal::ONE;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.bootstrap.thresholds.push(Decimal::ONE);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::from_file("/nonexistent/market-ledger.toml"),
            Err(Error::Io(_))
        ));
    }
}
