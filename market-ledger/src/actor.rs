//! One actor per market
//!
//! Each market is owned by a single Tokio task. Operations on the same
//! market are serialized through its mailbox; operations on different
//! markets run in parallel.
//!
//! ```text
//!   Ledger ──► MarketHandle (Clone) ──► mpsc (bounded) ──► MarketActor
//!                                                            │
//!                                                            ▼
//!                                                 Market::execute (draft, commit)
//! ```

use crate::liquidation::LiquidationOutcome;
use crate::market::{Market, MarketSnapshot};
use crate::types::{AccountId, AssetsShares, MarketId, MarketParams, Position, Quantity};
use crate::{Error, Result};
use alloy_primitives::U256;
use risk_engine::SolvencyReport;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Operation on one market
#[derive(Debug, Clone)]
pub enum MarketCommand {
    /// Supply loan assets
    Supply {
        /// Sender of the tokens
        caller: AccountId,
        /// Assets or shares
        quantity: Quantity,
        /// Credited position
        on_behalf: AccountId,
    },

    /// Withdraw loan assets
    Withdraw {
        /// Initiator
        caller: AccountId,
        /// Assets or shares
        quantity: Quantity,
        /// Debited position
        on_behalf: AccountId,
        /// Recipient of the tokens
        receiver: AccountId,
    },

    /// Pledge collateral
    SupplyCollateral {
        /// Sender of the tokens
        caller: AccountId,
        /// Collateral amount
        assets: U256,
        /// Credited position
        on_behalf: AccountId,
    },

    /// Release collateral
    WithdrawCollateral {
        /// Initiator
        caller: AccountId,
        /// Collateral amount
        assets: U256,
        /// Debited position
        on_behalf: AccountId,
        /// Recipient of the tokens
        receiver: AccountId,
    },

    /// Borrow loan assets
    Borrow {
        /// Initiator
        caller: AccountId,
        /// Assets or shares
        quantity: Quantity,
        /// Indebted position
        on_behalf: AccountId,
        /// Recipient of the tokens
        receiver: AccountId,
    },

    /// Repay debt
    Repay {
        /// Sender of the tokens
        caller: AccountId,
        /// Assets or shares
        quantity: Quantity,
        /// Position whose debt shrinks
        on_behalf: AccountId,
    },

    /// Liquidate an unhealthy position
    Liquidate {
        /// Repayer, receiver of the collateral
        liquidator: AccountId,
        /// Liquidated account
        borrower: AccountId,
        /// Collateral to seize (or zero)
        seized_assets: U256,
        /// Debt to repay (or zero)
        repaid_assets: U256,
    },

    /// Accrue interest to now
    AccrueInterest,

    /// Change the protocol fee
    SetFee {
        /// Must be the registry owner
        caller: AccountId,
        /// New fee (WAD)
        fee: U256,
    },

    /// Change the fee recipient
    SetFeeRecipient {
        /// Must be the registry owner
        caller: AccountId,
        /// New recipient
        recipient: AccountId,
    },

    /// Read a position
    Position {
        /// Account
        account: AccountId,
    },

    /// Solvency with interest accrued to now
    Solvency {
        /// Account
        account: AccountId,
    },
}

impl MarketCommand {
    /// Metric label
    pub fn name(&self) -> &'static str {
        match self {
            MarketCommand::Supply { .. } => "supply",
            MarketCommand::Withdraw { .. } => "withdraw",
            MarketCommand::SupplyCollateral { .. } => "supply_collateral",
            MarketCommand::WithdrawCollateral { .. } => "withdraw_collateral",
            MarketCommand::Borrow { .. } => "borrow",
            MarketCommand::Repay { .. } => "repay",
            MarketCommand::Liquidate { .. } => "liquidate",
            MarketCommand::AccrueInterest => "accrue_interest",
            MarketCommand::SetFee { .. } => "set_fee",
            MarketCommand::SetFeeRecipient { .. } => "set_fee_recipient",
            MarketCommand::Position { .. } => "position",
            MarketCommand::Solvency { .. } => "solvency",
        }
    }
}

/// Result of a [`MarketCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    /// Assets and shares moved
    Moved(AssetsShares),
    /// Nothing to report
    Done,
    /// Liquidation result
    Liquidated(LiquidationOutcome),
    /// Position read
    Position(Position),
    /// Solvency read
    Solvency(SolvencyReport),
}

impl CommandOutput {
    /// Assets and shares moved, or a `Concurrency` error
    pub fn into_moved(self) -> Result<AssetsShares> {
        match self {
            CommandOutput::Moved(moved) => Ok(moved),
            other => Err(unexpected(&other)),
        }
    }

    /// Liquidation result, or a `Concurrency` error
    pub fn into_liquidated(self) -> Result<LiquidationOutcome> {
        match self {
            CommandOutput::Liquidated(outcome) => Ok(outcome),
            other => Err(unexpected(&other)),
        }
    }

    /// Position, or a `Concurrency` error
    pub fn into_position(self) -> Result<Position> {
        match self {
            CommandOutput::Position(position) => Ok(position),
            other => Err(unexpected(&other)),
        }
    }

    /// Solvency report, or a `Concurrency` error
    pub fn into_solvency(self) -> Result<SolvencyReport> {
        match self {
            CommandOutput::Solvency(report) => Ok(report),
            other => Err(unexpected(&other)),
        }
    }

    /// Unit, or a `Concurrency` error
    pub fn into_done(self) -> Result<()> {
        match self {
            CommandOutput::Done => Ok(()),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(output: &CommandOutput) -> Error {
    Error::Concurrency(format!("Unexpected actor response: {:?}", output))
}

/// Message sent to a market actor
#[derive(Debug)]
pub enum MarketMessage {
    /// Run a command
    Execute {
        /// Command
        command: MarketCommand,
        /// Reply channel
        response: oneshot::Sender<Result<CommandOutput>>,
    },

    /// Read the committed state
    Snapshot {
        /// Reply channel
        response: oneshot::Sender<MarketSnapshot>,
    },

    /// Stop the actor
    Shutdown,
}

/// Actor owning one market
#[derive(Debug)]
pub struct MarketActor {
    market: Market,
    mailbox: mpsc::Receiver<MarketMessage>,
}

impl MarketActor {
    /// Create new actor
    pub fn new(market: Market, mailbox: mpsc::Receiver<MarketMessage>) -> Self {
        Self { market, mailbox }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                MarketMessage::Execute { command, response } => {
                    let name = command.name();
                    let started = Instant::now();
                    let result = self.apply(command);
                    self.market
                        .env
                        .metrics
                        .record_operation(name, &result, started.elapsed());

                    if let Err(e) = &result {
                        debug!(market = %self.market.id, operation = name, error = %e, "Operation rejected");
                    }
                    // Caller may have gone away
                    let _ = response.send(result);
                }
                MarketMessage::Snapshot { response } => {
                    let _ = response.send(self.market.snapshot());
                }
                MarketMessage::Shutdown => break,
            }
        }

        info!(market = %self.market.id, "Market actor stopped");
    }

    fn apply(&mut self, command: MarketCommand) -> Result<CommandOutput> {
        let market = &mut self.market;
        match command {
            MarketCommand::Supply {
                caller,
                quantity,
                on_behalf,
            } => market.supply(&caller, quantity, &on_behalf).map(CommandOutput::Moved),
            MarketCommand::Withdraw {
                caller,
                quantity,
                on_behalf,
                receiver,
            } => market
                .withdraw(&caller, quantity, &on_behalf, &receiver)
                .map(CommandOutput::Moved),
            MarketCommand::SupplyCollateral {
                caller,
                assets,
                on_behalf,
            } => market
                .supply_collateral(&caller, assets, &on_behalf)
                .map(|_| CommandOutput::Done),
            MarketCommand::WithdrawCollateral {
                caller,
                assets,
                on_behalf,
                receiver,
            } => market
                .withdraw_collateral(&caller, assets, &on_behalf, &receiver)
                .map(|_| CommandOutput::Done),
            MarketCommand::Borrow {
                caller,
                quantity,
                on_behalf,
                receiver,
            } => market
                .borrow(&caller, quantity, &on_behalf, &receiver)
                .map(CommandOutput::Moved),
            MarketCommand::Repay {
                caller,
                quantity,
                on_behalf,
            } => market.repay(&caller, quantity, &on_behalf).map(CommandOutput::Moved),
            MarketCommand::Liquidate {
                liquidator,
                borrower,
                seized_assets,
                repaid_assets,
            } => market
                .liquidate(&liquidator, &borrower, seized_assets, repaid_assets)
                .map(CommandOutput::Liquidated),
            MarketCommand::AccrueInterest => market.accrue_interest().map(|_| CommandOutput::Done),
            MarketCommand::SetFee { caller, fee } => market.set_fee(&caller, fee).map(|_| CommandOutput::Done),
            MarketCommand::SetFeeRecipient { caller, recipient } => market
                .set_fee_recipient(&caller, recipient)
                .map(|_| CommandOutput::Done),
            MarketCommand::Position { account } => Ok(CommandOutput::Position(market.position(&account))),
            MarketCommand::Solvency { account } => market.solvency(&account).map(CommandOutput::Solvency),
        }
    }
}

/// Handle for sending messages to a market actor
#[derive(Debug, Clone)]
pub struct MarketHandle {
    id: MarketId,
    params: MarketParams,
    sender: mpsc::Sender<MarketMessage>,
}

impl MarketHandle {
    /// Market id
    pub fn id(&self) -> MarketId {
        self.id
    }

    /// Immutable market parameters
    pub fn params(&self) -> &MarketParams {
        &self.params
    }

    /// Run a command on the market
    pub async fn execute(&self, command: MarketCommand) -> Result<CommandOutput> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MarketMessage::Execute { command, response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Committed state
    pub async fn snapshot(&self) -> Result<MarketSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MarketMessage::Snapshot { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(MarketMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the actor of `market`
pub fn spawn_market_actor(market: Market, mailbox_capacity: usize) -> MarketHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
    let handle = MarketHandle {
        id: market.id,
        params: market.params.clone(),
        sender: tx,
    };

    let actor = MarketActor::new(market, rx);
    tokio::spawn(async move {
        actor.run().await;
    });

    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::tests::{borrower, fixture, lender, units};

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let f = fixture();
        let handle = spawn_market_actor(f.market, 8);

        handle.shutdown().await.unwrap();
        // Give the task a moment to drop the mailbox
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(matches!(
            handle.execute(MarketCommand::AccrueInterest).await,
            Err(Error::Concurrency(_))
        ));
    }

    #[tokio::test]
    async fn test_actor_executes_commands() {
        let f = fixture();
        let metrics = f.market.env.metrics.clone();
        let handle = spawn_market_actor(f.market, 8);

        let moved = handle
            .execute(MarketCommand::Supply {
                caller: lender(),
                quantity: Quantity::Assets(units(100)),
                on_behalf: lender(),
            })
            .await
            .unwrap()
            .into_moved()
            .unwrap();
        assert_eq!(moved.assets, units(100));

        let position = handle
            .execute(MarketCommand::Position { account: lender() })
            .await
            .unwrap()
            .into_position()
            .unwrap();
        assert_eq!(position.supply_shares, moved.shares);

        let rejected = handle
            .execute(MarketCommand::Borrow {
                caller: borrower(),
                quantity: Quantity::Assets(units(1)),
                on_behalf: borrower(),
                receiver: borrower(),
            })
            .await;
        assert!(matches!(rejected, Err(Error::InsufficientCollateral(_))));

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state.total_supply_assets, units(100));
        assert_eq!(metrics.operations.with_label_values(&["supply", "ok"]).get(), 1);
        assert_eq!(
            metrics
                .operations
                .with_label_values(&["borrow", "insufficient_collateral"])
                .get(),
            1
        );

        handle.shutdown().await.unwrap();
    }

    #[test]
    fn test_unexpected_output() {
        assert!(matches!(CommandOutput::Done.into_moved(), Err(Error::Concurrency(_))));
        assert!(CommandOutput::Done.into_done().is_ok());
    }
}
