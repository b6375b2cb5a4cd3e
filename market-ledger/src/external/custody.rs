//! Token custody
//!
//! The ledger moves tokens only through [`settle`], which runs an
//! operation's transfer legs in order and compensates the executed legs in
//! reverse if one fails.

use crate::types::{AccountId, AssetId};
use alloy_primitives::U256;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use thiserror::Error;
use tracing::{error, warn};

/// Custody errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CustodyError {
    /// Source balance too small
    #[error("{holder} holds {available} {asset}, needs {needed}")]
    InsufficientFunds {
        /// Account or vault
        holder: String,
        /// Token
        asset: String,
        /// Requested amount
        needed: U256,
        /// Balance held
        available: U256,
    },

    /// Transfer refused
    #[error("transfer of {asset} rejected: {reason}")]
    Rejected {
        /// Token
        asset: String,
        /// Reason given by the token
        reason: String,
    },
}

/// Token movements into and out of the ledger's vault
pub trait TokenCustody: Send + Sync + Debug {
    /// Pull `amount` of `asset` from `from` into the vault
    fn deposit(&self, asset: &AssetId, from: &AccountId, amount: U256) -> Result<(), CustodyError>;

    /// Push `amount` of `asset` from the vault to `to`
    fn release(&self, asset: &AssetId, to: &AccountId, amount: U256) -> Result<(), CustodyError>;
}

/// One token movement of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferLeg {
    /// Account to vault
    Deposit {
        /// Token
        asset: AssetId,
        /// Payer
        from: AccountId,
        /// Amount
        amount: U256,
    },
    /// Vault to account
    Release {
        /// Token
        asset: AssetId,
        /// Payee
        to: AccountId,
        /// Amount
        amount: U256,
    },
}

impl TransferLeg {
    fn execute(&self, custody: &dyn TokenCustody) -> Result<(), CustodyError> {
        match self {
            TransferLeg::Deposit { asset, from, amount } => custody.deposit(asset, from, *amount),
            TransferLeg::Release { asset, to, amount } => custody.release(asset, to, *amount),
        }
    }

    fn reverse(&self) -> TransferLeg {
        match self.clone() {
            TransferLeg::Deposit { asset, from, amount } => TransferLeg::Release {
                asset,
                to: from,
                amount,
            },
            TransferLeg::Release { asset, to, amount } => TransferLeg::Deposit {
                asset,
                from: to,
                amount,
            },
        }
    }

    fn amount(&self) -> U256 {
        match self {
            TransferLeg::Deposit { amount, .. } | TransferLeg::Release { amount, .. } => *amount,
        }
    }
}

/// Execute `legs` in order; on failure undo the executed ones in reverse
pub fn settle(custody: &dyn TokenCustody, legs: &[TransferLeg]) -> Result<(), CustodyError> {
    for (index, leg) in legs.iter().enumerate() {
        if leg.amount().is_zero() {
            continue;
        }

        if let Err(err) = leg.execute(custody) {
            warn!(leg = ?leg, error = %err, "Transfer failed, compensating {} legs", index);

            for done in legs[..index].iter().rev().filter(|l| !l.amount().is_zero()) {
                if let Err(comp_err) = done.reverse().execute(custody) {
                    error!(leg = ?done, error = %comp_err, "Compensation failed");
                }
            }
            return Err(err);
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Balances {
    wallets: HashMap<(AccountId, AssetId), U256>,
    vault: HashMap<AssetId, U256>,
    halted: HashSet<AssetId>,
}

/// In-memory wallets plus a vault per asset
#[derive(Debug, Default)]
pub struct InMemoryCustody {
    balances: Mutex<Balances>,
}

impl InMemoryCustody {
    /// Create empty custody
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a wallet out of thin air (faucet)
    pub fn mint(&self, account: &AccountId, asset: &AssetId, amount: U256) {
        let mut balances = self.balances.lock();
        let balance = balances
            .wallets
            .entry((account.clone(), asset.clone()))
            .or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Wallet balance
    pub fn balance_of(&self, account: &AccountId, asset: &AssetId) -> U256 {
        self.balances
            .lock()
            .wallets
            .get(&(account.clone(), asset.clone()))
            .copied()
            .unwrap_or_default()
    }

    /// Vault balance
    pub fn vault_balance(&self, asset: &AssetId) -> U256 {
        self.balances.lock().vault.get(asset).copied().unwrap_or_default()
    }

    /// Refuse every transfer of `asset` until resumed
    pub fn halt(&self, asset: &AssetId) {
        self.balances.lock().halted.insert(asset.clone());
    }

    /// Accept transfers of `asset` again
    pub fn resume(&self, asset: &AssetId) {
        self.balances.lock().halted.remove(asset);
    }
}

impl Balances {
    fn check_halted(&self, asset: &AssetId) -> Result<(), CustodyError> {
        if self.halted.contains(asset) {
            return Err(CustodyError::Rejected {
                asset: asset.to_string(),
                reason: "transfers halted".to_string(),
            });
        }
        Ok(())
    }
}

impl TokenCustody for InMemoryCustody {
    fn deposit(&self, asset: &AssetId, from: &AccountId, amount: U256) -> Result<(), CustodyError> {
        let mut balances = self.balances.lock();
        balances.check_halted(asset)?;

        let key = (from.clone(), asset.clone());
        let available = balances.wallets.get(&key).copied().unwrap_or_default();
        if available < amount {
            return Err(CustodyError::InsufficientFunds {
                holder: from.to_string(),
                asset: asset.to_string(),
                needed: amount,
                available,
            });
        }

        balances.wallets.insert(key, available - amount);
        let vault = balances.vault.entry(asset.clone()).or_default();
        *vault = vault.saturating_add(amount);
        Ok(())
    }

    fn release(&self, asset: &AssetId, to: &AccountId, amount: U256) -> Result<(), CustodyError> {
        let mut balances = self.balances.lock();
        balances.check_halted(asset)?;

        let available = balances.vault.get(asset).copied().unwrap_or_default();
        if available < amount {
            return Err(CustodyError::InsufficientFunds {
                holder: "vault".to_string(),
                asset: asset.to_string(),
                needed: amount,
                available,
            });
        }

        balances.vault.insert(asset.clone(), available - amount);
        let wallet = balances.wallets.entry((to.clone(), asset.clone())).or_default();
        *wallet = wallet.saturating_add(amount);
        Ok(())
    }
}
