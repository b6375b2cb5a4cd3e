//! Credit attestation
//!
//! An account's tier is private to it: a viewer may read the tier only
//! while the account's permission grant to that viewer is live.

use super::clock::Clock;
use crate::types::AccountId;
use dashmap::DashMap;
use risk_engine::{CreditTier, TierLabel};
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// Attestation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttestationError {
    /// Subject never granted the viewer access
    #[error("{subject} has not granted {viewer} access")]
    NoGrant {
        /// Attested account
        subject: String,
        /// Reader
        viewer: String,
    },

    /// Grant lapsed
    #[error("grant from {subject} to {viewer} expired at {expired_at}")]
    GrantExpired {
        /// Attested account
        subject: String,
        /// Reader
        viewer: String,
        /// Unix seconds
        expired_at: u64,
    },

    /// Service unreachable
    #[error("attestation service unavailable: {0}")]
    Unavailable(String),
}

/// Source of credit tiers
pub trait CreditAttestation: Send + Sync + Debug {
    /// Tier of `subject` as visible to `viewer`
    fn tier_of(&self, subject: &AccountId, viewer: &AccountId) -> Result<CreditTier, AttestationError>;
}

/// In-memory attestation registry with expiring grants
#[derive(Debug)]
pub struct InMemoryAttestation {
    tiers: DashMap<AccountId, TierLabel>,
    grants: DashMap<(AccountId, AccountId), u64>,
    clock: Arc<dyn Clock>,
}

impl InMemoryAttestation {
    /// Create an empty registry
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tiers: DashMap::new(),
            grants: DashMap::new(),
            clock,
        }
    }

    /// Attest `subject` at `tier`
    pub fn set_tier(&self, subject: AccountId, tier: TierLabel) {
        self.tiers.insert(subject, tier);
    }

    /// Withdraw the attestation of `subject`
    pub fn clear_tier(&self, subject: &AccountId) {
        self.tiers.remove(subject);
    }

    /// Let `viewer` read the tier of `subject` for `duration_secs`
    pub fn grant(&self, subject: AccountId, viewer: AccountId, duration_secs: u64) {
        let expires_at = self.clock.now().saturating_add(duration_secs);
        self.grants.insert((subject, viewer), expires_at);
    }

    /// Revoke a grant
    pub fn revoke(&self, subject: &AccountId, viewer: &AccountId) {
        self.grants.remove(&(subject.clone(), viewer.clone()));
    }
}

impl CreditAttestation for InMemoryAttestation {
    fn tier_of(&self, subject: &AccountId, viewer: &AccountId) -> Result<CreditTier, AttestationError> {
        let expires_at = self
            .grants
            .get(&(subject.clone(), viewer.clone()))
            .map(|entry| *entry.value())
            .ok_or_else(|| AttestationError::NoGrant {
                subject: subject.to_string(),
                viewer: viewer.to_string(),
            })?;

        if self.clock.now() >= expires_at {
            return Err(AttestationError::GrantExpired {
                subject: subject.to_string(),
                viewer: viewer.to_string(),
                expired_at: expires_at,
            });
        }

        Ok(self
            .tiers
            .get(subject)
            .map(|entry| CreditTier::Graded(entry.value().clone()))
            .unwrap_or(CreditTier::Ungraded))
    }
}
