//! Ledger events for indexers
//!
//! Events of committed operations are wrapped in an envelope and published
//! on a broadcast channel. Failed operations publish nothing.

use crate::types::{AccountId, MarketId, MarketParams, Position, RateModelId};
use alloy_primitives::U256;
use risk_engine::TierLabel;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Event emitted by a committed ledger operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Market created
    MarketCreated {
        /// Immutable parameters
        params: MarketParams,
    },

    /// Interest accrued
    InterestAccrued {
        /// Per-second rate (WAD)
        rate: U256,
        /// Interest added to both totals
        interest: U256,
        /// Supply shares minted to the fee recipient
        fee_shares: U256,
    },

    /// Loan asset supplied
    Supplied {
        /// Sender of the tokens
        caller: AccountId,
        /// Credited position
        on_behalf: AccountId,
        /// Assets supplied
        assets: U256,
        /// Shares minted
        shares: U256,
    },

    /// Loan asset withdrawn
    Withdrawn {
        /// Initiator
        caller: AccountId,
        /// Debited position
        on_behalf: AccountId,
        /// Recipient of the tokens
        receiver: AccountId,
        /// Assets withdrawn
        assets: U256,
        /// Shares burned
        shares: U256,
    },

    /// Collateral supplied
    CollateralSupplied {
        /// Sender of the tokens
        caller: AccountId,
        /// Credited position
        on_behalf: AccountId,
        /// Collateral amount
        assets: U256,
    },

    /// Collateral withdrawn
    CollateralWithdrawn {
        /// Initiator
        caller: AccountId,
        /// Debited position
        on_behalf: AccountId,
        /// Recipient of the tokens
        receiver: AccountId,
        /// Collateral amount
        assets: U256,
    },

    /// Loan asset borrowed
    Borrowed {
        /// Initiator
        caller: AccountId,
        /// Indebted position
        on_behalf: AccountId,
        /// Recipient of the tokens
        receiver: AccountId,
        /// Assets borrowed
        assets: U256,
        /// Borrow shares minted
        shares: U256,
    },

    /// Debt repaid
    Repaid {
        /// Sender of the tokens
        caller: AccountId,
        /// Position whose debt shrinks
        on_behalf: AccountId,
        /// Assets repaid
        assets: U256,
        /// Borrow shares burned
        shares: U256,
    },

    /// Position liquidated
    Liquidated {
        /// Repayer, receiver of the collateral
        liquidator: AccountId,
        /// Liquidated account
        borrower: AccountId,
        /// Collateral seized
        seized_assets: U256,
        /// Debt repaid
        repaid_assets: U256,
        /// Borrow shares burned against repayment
        repaid_shares: U256,
        /// Debt written off against suppliers
        bad_debt_assets: U256,
        /// Borrow shares written off
        bad_debt_shares: U256,
        /// Position before
        before: Position,
        /// Position after
        after: Position,
    },

    /// Protocol fee changed
    FeeSet {
        /// New fee (WAD)
        fee: U256,
    },

    /// Fee recipient changed
    FeeRecipientSet {
        /// New recipient
        recipient: AccountId,
    },

    /// Credit-tier override set or cleared
    TierThresholdSet {
        /// Tier
        tier: TierLabel,
        /// New threshold; `None` when cleared
        threshold: Option<U256>,
    },

    /// Rate model allow-listed
    RateModelEnabled {
        /// Model reference
        rate_model: RateModelId,
    },

    /// Base threshold allow-listed
    ThresholdEnabled {
        /// Threshold (WAD)
        threshold: U256,
    },

    /// Authorization granted or revoked
    AuthorizationSet {
        /// Position owner
        authorizer: AccountId,
        /// Account acting for it
        authorized: AccountId,
        /// Granted or revoked
        granted: bool,
    },

    /// Registry ownership transferred
    OwnerSet {
        /// New owner
        owner: AccountId,
    },
}

impl LedgerEvent {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::MarketCreated { .. } => "market_created",
            LedgerEvent::InterestAccrued { .. } => "interest_accrued",
            LedgerEvent::Supplied { .. } => "supplied",
            LedgerEvent::Withdrawn { .. } => "withdrawn",
            LedgerEvent::CollateralSupplied { .. } => "collateral_supplied",
            LedgerEvent::CollateralWithdrawn { .. } => "collateral_withdrawn",
            LedgerEvent::Borrowed { .. } => "borrowed",
            LedgerEvent::Repaid { .. } => "repaid",
            LedgerEvent::Liquidated { .. } => "liquidated",
            LedgerEvent::FeeSet { .. } => "fee_set",
            LedgerEvent::FeeRecipientSet { .. } => "fee_recipient_set",
            LedgerEvent::TierThresholdSet { .. } => "tier_threshold_set",
            LedgerEvent::RateModelEnabled { .. } => "rate_model_enabled",
            LedgerEvent::ThresholdEnabled { .. } => "threshold_enabled",
            LedgerEvent::AuthorizationSet { .. } => "authorization_set",
            LedgerEvent::OwnerSet { .. } => "owner_set",
        }
    }
}

/// Published event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID (UUIDv7 for time-ordering)
    pub event_id: Uuid,

    /// Market concerned; `None` for registry events
    pub market_id: Option<MarketId>,

    /// Ledger time (unix seconds)
    pub timestamp: u64,

    /// Payload
    pub event: LedgerEvent,
}

/// Broadcast channel of committed events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Channel keeping up to `capacity` undelivered events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// New subscriber; sees events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Publish events in order
    pub fn publish(&self, market_id: Option<MarketId>, timestamp: u64, events: impl IntoIterator<Item = LedgerEvent>) {
        for event in events {
            let envelope = EventEnvelope {
                event_id: Uuid::now_v7(),
                market_id,
                timestamp,
                event,
            };
            // No subscribers is fine
            let _ = self.sender.send(envelope);
        }
    }
}
