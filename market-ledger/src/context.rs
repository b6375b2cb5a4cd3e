//! Shared services of all markets
//!
//! Everything here is safe to share between market actors: maps are
//! concurrent, collaborators are `Send + Sync`.

use crate::events::EventBus;
use crate::external::{Clock, CreditAttestation, OracleDirectory, TokenCustody};
use crate::metrics::Metrics;
use crate::registry::Registry;
use crate::risk::RiskEngine;
use crate::types::AccountId;
use crate::Result;
use alloy_primitives::U256;
use dashmap::DashMap;
use risk_engine::IncentiveCurve;
use std::sync::Arc;

/// External services a ledger is opened with
#[derive(Debug, Clone)]
pub struct Collaborators {
    /// Credit tiers
    pub attestation: Arc<dyn CreditAttestation>,
    /// Token transfers
    pub custody: Arc<dyn TokenCustody>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

/// Who may act on whose positions
#[derive(Debug, Default)]
pub struct Authorizations {
    grants: DashMap<(AccountId, AccountId), bool>,
}

impl Authorizations {
    /// Record whether `authorized` may act for `authorizer`
    pub fn set(&self, authorizer: AccountId, authorized: AccountId, granted: bool) {
        if granted {
            self.grants.insert((authorizer, authorized), true);
        } else {
            self.grants.remove(&(authorizer, authorized));
        }
    }

    /// `caller` is `on_behalf` itself or was authorized by it
    pub fn is_authorized(&self, on_behalf: &AccountId, caller: &AccountId) -> bool {
        on_behalf == caller
            || self
                .grants
                .get(&(on_behalf.clone(), caller.clone()))
                .map(|entry| *entry.value())
                .unwrap_or(false)
    }
}

/// Services shared by every market of a ledger
#[derive(Debug)]
pub struct Environment {
    /// Allow-lists and ownership
    pub registry: Registry,
    /// Price sources
    pub oracles: Arc<OracleDirectory>,
    /// Thresholds and solvency
    pub risk: RiskEngine,
    /// Liquidation incentive
    pub incentive: Arc<dyn IncentiveCurve>,
    /// Token transfers
    pub custody: Arc<dyn TokenCustody>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Position delegation
    pub authorizations: Authorizations,
    /// Committed events
    pub events: EventBus,
    /// Prometheus collectors
    pub metrics: Metrics,
    /// Highest protocol fee (WAD)
    pub max_fee: U256,
}

impl Environment {
    /// Assemble the shared services
    pub fn new(
        owner: AccountId,
        principal: AccountId,
        collaborators: Collaborators,
        incentive: Arc<dyn IncentiveCurve>,
        max_fee: U256,
        event_buffer: usize,
    ) -> Result<Self> {
        let oracles = Arc::new(OracleDirectory::new());
        let risk = RiskEngine::new(collaborators.attestation, Arc::clone(&oracles), principal);
        let metrics = Metrics::new().map_err(|e| crate::Error::Config(format!("Failed to create metrics: {}", e)))?;

        Ok(Self {
            registry: Registry::new(owner),
            oracles,
            risk,
            incentive,
            custody: collaborators.custody,
            clock: collaborators.clock,
            authorizations: Authorizations::default(),
            events: EventBus::new(event_buffer),
            metrics,
            max_fee,
        })
    }

    /// Ledger time
    pub fn now(&self) -> u64 {
        self.clock.now()
    }
}
