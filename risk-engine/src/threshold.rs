//! Risk thresholds and credit-tier overrides

use crate::math::WAD;
use crate::{Error, Result};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a tier label, in bytes
pub const MAX_TIER_LABEL_LEN: usize = 8;

/// Credit tier label as reported by the attestation service (e.g. `AAA+`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TierLabel(String);

impl TierLabel {
    /// Create a label; must be non-empty and at most eight bytes
    pub fn new(label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        if label.is_empty() || label.len() > MAX_TIER_LABEL_LEN {
            return Err(Error::InvalidConfig(format!(
                "tier label {:?} must be 1..={} bytes",
                label, MAX_TIER_LABEL_LEN
            )));
        }
        Ok(Self(label))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TierLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Credit standing of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditTier {
    /// Attested tier
    Graded(TierLabel),
    /// No attestation, or none the ledger may read
    Ungraded,
}

impl CreditTier {
    /// Tier label, if graded
    pub fn label(&self) -> Option<&TierLabel> {
        match self {
            CreditTier::Graded(label) => Some(label),
            CreditTier::Ungraded => None,
        }
    }
}

/// Check a base threshold lies in `[0, 1)`
pub fn validate_base_threshold(threshold: U256) -> Result<()> {
    if threshold >= WAD {
        return Err(Error::InvalidThreshold(format!(
            "base threshold {} must be below {}",
            threshold, WAD
        )));
    }
    Ok(())
}

/// Check an override is strictly above the base threshold it replaces
pub fn validate_override(base: U256, threshold: U256) -> Result<()> {
    if threshold <= base {
        return Err(Error::InvalidThreshold(format!(
            "tier threshold {} must exceed base threshold {}",
            threshold, base
        )));
    }
    Ok(())
}

/// Threshold that applies to a borrower: the override if it beats the base
pub fn resolve(base: U256, tier_override: Option<U256>) -> U256 {
    match tier_override {
        Some(threshold) if threshold > base => threshold,
        _ => base,
    }
}
