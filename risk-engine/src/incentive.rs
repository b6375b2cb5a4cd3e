//! Liquidation incentive curves
//!
//! The incentive factor (`> 1.0`, WAD) is the ratio of collateral value a
//! liquidator receives to debt value repaid. Curves are pluggable; each is a
//! deterministic function of the borrower's effective threshold and current
//! health factor.

use crate::math::{checked_add, checked_sub, w_div_down, w_mul_down, wad_from_decimal, WAD};
use crate::{Error, Result};
use alloy_primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;

/// Inputs an incentive curve may depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncentiveInputs {
    /// Effective threshold of the liquidated borrower (WAD)
    pub threshold: U256,

    /// Health factor of the position before liquidation (WAD)
    pub health_factor: U256,
}

/// Pluggable incentive curve
pub trait IncentiveCurve: Send + Sync + Debug {
    /// Incentive factor in WAD; always strictly above `WAD`
    fn incentive_factor(&self, inputs: &IncentiveInputs) -> Result<U256>;
}

/// `clamp(1 / (1 - cursor * (1 - threshold)), min, max)`
///
/// Lower thresholds (riskier collateral) yield larger incentives. For
/// thresholds at or above 1.0 the raw factor drops below 1.0 and the floor
/// applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorCurve {
    cursor: U256,
    min_factor: U256,
    max_factor: U256,
}

impl CursorCurve {
    /// Create a curve; `0 < cursor < 1` and `1 < min_factor <= max_factor`
    pub fn new(cursor: U256, min_factor: U256, max_factor: U256) -> Result<Self> {
        if cursor.is_zero() || cursor >= WAD {
            return Err(Error::InvalidConfig(format!(
                "cursor {} must lie in (0, 1)",
                cursor
            )));
        }
        if min_factor <= WAD || max_factor < min_factor {
            return Err(Error::InvalidConfig(format!(
                "incentive bounds [{}, {}] must satisfy 1 < min <= max",
                min_factor, max_factor
            )));
        }
        Ok(Self {
            cursor,
            min_factor,
            max_factor,
        })
    }
}

impl Default for CursorCurve {
    fn default() -> Self {
        Self {
            cursor: U256::from(300_000_000_000_000_000u64),       // 0.3
            min_factor: U256::from(1_005_000_000_000_000_000u64), // 1.005
            max_factor: U256::from(1_150_000_000_000_000_000u64), // 1.15
        }
    }
}

impl IncentiveCurve for CursorCurve {
    fn incentive_factor(&self, inputs: &IncentiveInputs) -> Result<U256> {
        let threshold = inputs.threshold;
        let denominator = if threshold < WAD {
            checked_sub(WAD, w_mul_down(self.cursor, WAD - threshold)?)?
        } else {
            checked_add(WAD, w_mul_down(self.cursor, threshold - WAD)?)?
        };

        let raw = w_div_down(WAD, denominator)?;
        Ok(raw.clamp(self.min_factor, self.max_factor))
    }
}

/// `1 + min_bonus + (max_bonus - min_bonus) * min(1, steepness * (1 - hf))`
///
/// The deeper the position sits below a health factor of 1.0, the larger
/// the bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthScaledCurve {
    min_bonus: U256,
    max_bonus: U256,
    steepness: U256,
}

impl HealthScaledCurve {
    /// Create a curve; `0 < min_bonus <= max_bonus < 1`
    pub fn new(min_bonus: U256, max_bonus: U256, steepness: U256) -> Result<Self> {
        if min_bonus.is_zero() || max_bonus < min_bonus || max_bonus >= WAD {
            return Err(Error::InvalidConfig(format!(
                "bonus bounds [{}, {}] must satisfy 0 < min <= max < 1",
                min_bonus, max_bonus
            )));
        }
        Ok(Self {
            min_bonus,
            max_bonus,
            steepness,
        })
    }
}

impl IncentiveCurve for HealthScaledCurve {
    fn incentive_factor(&self, inputs: &IncentiveInputs) -> Result<U256> {
        let gap = WAD.saturating_sub(inputs.health_factor);
        let scaled = w_mul_down(self.steepness, gap)?.min(WAD);
        let increment = w_mul_down(self.max_bonus - self.min_bonus, scaled)?;

        checked_add(WAD + self.min_bonus, increment)
    }
}

/// Serializable curve selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "curve", rename_all = "snake_case")]
pub enum IncentiveConfig {
    /// [`CursorCurve`]
    Cursor {
        /// Cursor in (0, 1)
        cursor: Decimal,
        /// Floor of the factor
        min_factor: Decimal,
        /// Cap of the factor
        max_factor: Decimal,
    },

    /// [`HealthScaledCurve`]
    HealthScaled {
        /// Bonus at a health factor of exactly 1.0
        min_bonus: Decimal,
        /// Bonus cap
        max_bonus: Decimal,
        /// Rate at which the bonus grows as health falls
        steepness: Decimal,
    },
}

impl Default for IncentiveConfig {
    fn default() -> Self {
        // Static literals; parsing cannot fail
        let parse = |s: &str| Decimal::from_str(s).unwrap_or_default();
        IncentiveConfig::Cursor {
            cursor: parse("0.3"),
            min_factor: parse("1.005"),
            max_factor: parse("1.15"),
        }
    }
}

impl IncentiveConfig {
    /// Build the configured curve
    pub fn build(&self) -> Result<Arc<dyn IncentiveCurve>> {
        match self {
            IncentiveConfig::Cursor {
                cursor,
                min_factor,
                max_factor,
            } => Ok(Arc::new(CursorCurve::new(
                wad_from_decimal(*cursor)?,
                wad_from_decimal(*min_factor)?,
                wad_from_decimal(*max_factor)?,
            )?)),
            IncentiveConfig::HealthScaled {
                min_bonus,
                max_bonus,
                steepness,
            } => Ok(Arc::new(HealthScaledCurve::new(
                wad_from_decimal(*min_bonus)?,
                wad_from_decimal(*max_bonus)?,
                wad_from_decimal(*steepness)?,
            )?)),
        }
    }
}
