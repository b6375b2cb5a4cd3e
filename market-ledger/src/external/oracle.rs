//! Price oracles
//!
//! Prices quote one collateral unit in loan-asset units, scaled by `1e36`.
//! Prices are read fresh on every operation and never cached.

use super::clock::Clock;
use crate::types::{MarketId, OracleId};
use alloy_primitives::U256;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// Oracle-related errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// No oracle registered under this reference
    #[error("Oracle not registered: {0}")]
    NotRegistered(String),

    /// Price older than the oracle accepts
    #[error("Stale price from {oracle}: {age_secs}s old, limit {max_age_secs}s")]
    StalePrice {
        /// Oracle reference
        oracle: String,
        /// Seconds since the last update
        age_secs: u64,
        /// Accepted age
        max_age_secs: u64,
    },

    /// Price of zero
    #[error("Oracle reported a zero price")]
    ZeroPrice,

    /// Feed down or unreachable
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),
}

/// Price source for a market
pub trait PriceOracle: Send + Sync + Debug {
    /// Price of one collateral unit in loan units, scaled by `1e36`
    fn price(&self, market: &MarketId) -> Result<U256, OracleError>;
}

#[derive(Debug, Clone, Copy)]
struct Quote {
    price: U256,
    updated_at: u64,
}

/// Settable in-memory oracle with optional staleness limit
#[derive(Debug)]
pub struct StaticOracle {
    name: String,
    quote: RwLock<Option<Quote>>,
    max_age_secs: Option<u64>,
    clock: Arc<dyn Clock>,
}

impl StaticOracle {
    /// Oracle with an initial price
    pub fn new(name: impl Into<String>, price: U256, clock: Arc<dyn Clock>) -> Self {
        let oracle = Self {
            name: name.into(),
            quote: RwLock::new(None),
            max_age_secs: None,
            clock,
        };
        oracle.set_price(price);
        oracle
    }

    /// Reject prices older than `max_age_secs`
    pub fn with_max_age(mut self, max_age_secs: u64) -> Self {
        self.max_age_secs = Some(max_age_secs);
        self
    }

    /// Publish a new price, stamped with the current time
    pub fn set_price(&self, price: U256) {
        *self.quote.write() = Some(Quote {
            price,
            updated_at: self.clock.now(),
        });
    }

    /// Take the feed offline
    pub fn clear(&self) {
        *self.quote.write() = None;
    }
}

impl PriceOracle for StaticOracle {
    fn price(&self, _market: &MarketId) -> Result<U256, OracleError> {
        let quote = (*self.quote.read()).ok_or_else(|| OracleError::Unavailable(self.name.clone()))?;

        if let Some(max_age_secs) = self.max_age_secs {
            let age_secs = self.clock.now().saturating_sub(quote.updated_at);
            if age_secs > max_age_secs {
                return Err(OracleError::StalePrice {
                    oracle: self.name.clone(),
                    age_secs,
                    max_age_secs,
                });
            }
        }

        Ok(quote.price)
    }
}

/// Oracles by reference
#[derive(Debug, Default)]
pub struct OracleDirectory {
    oracles: DashMap<OracleId, Arc<dyn PriceOracle>>,
}

impl OracleDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an oracle
    pub fn register(&self, id: OracleId, oracle: Arc<dyn PriceOracle>) {
        self.oracles.insert(id, oracle);
    }

    /// Whether a reference resolves
    pub fn contains(&self, id: &OracleId) -> bool {
        self.oracles.contains_key(id)
    }

    /// Read a nonzero price for `market` from oracle `id`
    pub fn price(&self, id: &OracleId, market: &MarketId) -> Result<U256, OracleError> {
        let oracle = self
            .oracles
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| OracleError::NotRegistered(id.to_string()))?;

        let price = oracle.price(market)?;
        if price.is_zero() {
            return Err(OracleError::ZeroPrice);
        }
        Ok(price)
    }
}
