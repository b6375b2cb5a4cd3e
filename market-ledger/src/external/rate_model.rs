//! Interest-rate models
//!
//! A model maps utilization (WAD) to a per-second borrow rate (WAD). The
//! ledger treats models as pure functions of the reported state.

use crate::types::MarketId;
use alloy_primitives::U256;
use risk_engine::math::{checked_add, mul_div_down, per_second_from_yearly, w_mul_down, wad_from_decimal, WAD};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// Rate-model errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateModelError {
    /// Model could not produce a rate
    #[error("Rate unavailable: {0}")]
    Unavailable(String),

    /// Arithmetic failure inside the model
    #[error("Rate computation failed: {0}")]
    Computation(String),

    /// Invalid model parameters
    #[error("Invalid rate model: {0}")]
    InvalidParameters(String),
}

impl From<risk_engine::Error> for RateModelError {
    fn from(err: risk_engine::Error) -> Self {
        RateModelError::Computation(err.to_string())
    }
}

/// Borrow-rate curve
pub trait RateModel: Send + Sync + Debug {
    /// Per-second borrow rate (WAD) at `utilization` (WAD)
    fn borrow_rate_per_second(&self, market: &MarketId, utilization: U256) -> Result<U256, RateModelError>;
}

/// Constant rate regardless of utilization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRate {
    rate_per_second: U256,
}

impl FixedRate {
    /// From a per-second WAD rate
    pub fn per_second(rate_per_second: U256) -> Self {
        Self { rate_per_second }
    }

    /// From a yearly WAD rate
    pub fn from_yearly(yearly: U256) -> Self {
        Self::per_second(per_second_from_yearly(yearly))
    }
}

impl RateModel for FixedRate {
    fn borrow_rate_per_second(&self, _market: &MarketId, _utilization: U256) -> Result<U256, RateModelError> {
        Ok(self.rate_per_second)
    }
}

/// Two-slope curve with a kink at target utilization
///
/// Below the kink: `base + u * slope1`. Above: `base + kink * slope1 +
/// (u - kink) * slope2`. Parameters are yearly WAD rates; the result is
/// converted to a per-second rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KinkedRate {
    base: U256,
    slope1: U256,
    slope2: U256,
    kink: U256,
}

impl KinkedRate {
    /// Create a curve; `0 < kink < 1`
    pub fn new(base: U256, slope1: U256, slope2: U256, kink: U256) -> Result<Self, RateModelError> {
        if kink.is_zero() || kink >= WAD {
            return Err(RateModelError::InvalidParameters(format!(
                "kink {} must lie in (0, 1)",
                kink
            )));
        }
        Ok(Self {
            base,
            slope1,
            slope2,
            kink,
        })
    }

    fn yearly_rate(&self, utilization: U256) -> Result<U256, risk_engine::Error> {
        let utilization = utilization.min(WAD);
        if utilization <= self.kink {
            return checked_add(self.base, w_mul_down(utilization, self.slope1)?);
        }

        let at_kink = checked_add(self.base, w_mul_down(self.kink, self.slope1)?)?;
        let excess = mul_div_down(utilization - self.kink, self.slope2, WAD)?;
        checked_add(at_kink, excess)
    }
}

impl RateModel for KinkedRate {
    fn borrow_rate_per_second(&self, _market: &MarketId, utilization: U256) -> Result<U256, RateModelError> {
        Ok(per_second_from_yearly(self.yearly_rate(utilization)?))
    }
}

/// Serializable rate-model definition (yearly decimal rates)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateModelConfig {
    /// [`FixedRate`]
    Fixed {
        /// Yearly rate, e.g. `0.05`
        apr: Decimal,
    },

    /// [`KinkedRate`]
    Kinked {
        /// Rate at zero utilization
        base: Decimal,
        /// Slope up to the kink
        slope1: Decimal,
        /// Slope past the kink
        slope2: Decimal,
        /// Target utilization
        kink: Decimal,
    },
}

impl RateModelConfig {
    /// Build the configured model
    pub fn build(&self) -> Result<Arc<dyn RateModel>, RateModelError> {
        match self {
            RateModelConfig::Fixed { apr } => Ok(Arc::new(FixedRate::from_yearly(wad_from_decimal(*apr)?))),
            RateModelConfig::Kinked {
                base,
                slope1,
                slope2,
                kink,
            } => Ok(Arc::new(KinkedRate::new(
                wad_from_decimal(*base)?,
                wad_from_decimal(*slope1)?,
                wad_from_decimal(*slope2)?,
                wad_from_decimal(*kink)?,
            )?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetId, MarketParams, OracleId, RateModelId};
    use risk_engine::math::SECONDS_PER_YEAR;
    use std::str::FromStr;

    fn pct(n: u64) -> U256 {
        U256::from(n) * WAD / U256::from(100u8)
    }

    fn market() -> MarketId {
        MarketParams {
            loan_asset: AssetId::new("USDC"),
            collateral_asset: AssetId::new("WETH"),
            oracle: OracleId::new("weth-usdc"),
            rate_model: RateModelId::new("kinked"),
            base_threshold: U256::ZERO,
        }
        .id()
    }

    #[test]
    fn test_fixed_rate_ignores_utilization() {
        let model = FixedRate::from_yearly(pct(5));
        let low = model.borrow_rate_per_second(&market(), U256::ZERO).unwrap();
        let high = model.borrow_rate_per_second(&market(), WAD).unwrap();
        assert_eq!(low, high);
        assert_eq!(low, pct(5) / U256::from(SECONDS_PER_YEAR));
    }

    #[test]
    fn test_kinked_rate_slopes() {
        let model = KinkedRate::new(pct(2), pct(10), pct(100), pct(80)).unwrap();

        assert_eq!(model.yearly_rate(U256::ZERO).unwrap(), pct(2));
        assert_eq!(model.yearly_rate(pct(80)).unwrap(), pct(10));
        assert_eq!(model.yearly_rate(pct(90)).unwrap(), pct(20));
        assert_eq!(model.yearly_rate(WAD).unwrap(), pct(30));
    }

    #[test]
    fn test_kinked_rate_rejects_bad_kink() {
        assert!(KinkedRate::new(pct(2), pct(10), pct(100), WAD).is_err());
        assert!(KinkedRate::new(pct(2), pct(10), pct(100), U256::ZERO).is_err());
    }

    #[test]
    fn test_config_builds_model() {
        let config = RateModelConfig::Fixed {
            apr: Decimal::from_str("0.05").unwrap(),
        };
        let model = config.build().unwrap();
        assert!(model.borrow_rate_per_second(&market(), U256::ZERO).unwrap() > U256::ZERO);
    }
}
